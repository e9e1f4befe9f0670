use crate::definition::{PreferenceDefinition, PreferenceKey};
use crate::scope::ScopeKind;
use crate::PreferenceError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// In-memory collection of preference definitions for one scope.
#[derive(Debug, Clone)]
pub struct PreferenceRegistry {
    scope: ScopeKind,
    definitions: BTreeMap<PreferenceKey, Arc<PreferenceDefinition>>,
}

impl PreferenceRegistry {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            scope,
            definitions: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn register(&mut self, definition: PreferenceDefinition) -> Result<(), PreferenceError> {
        let key = definition.key().clone();
        if self.definitions.contains_key(&key) {
            return Err(PreferenceError::DuplicateDefinition {
                scope: self.scope,
                key,
            });
        }
        self.definitions.insert(key, Arc::new(definition));
        Ok(())
    }

    pub fn with(mut self, definition: PreferenceDefinition) -> Result<Self, PreferenceError> {
        self.register(definition)?;
        Ok(self)
    }

    pub fn get(
        &self,
        section: Option<&str>,
        name: &str,
    ) -> Result<Arc<PreferenceDefinition>, PreferenceError> {
        self.get_key(&PreferenceKey::new(section, name))
    }

    pub fn get_key(
        &self,
        key: &PreferenceKey,
    ) -> Result<Arc<PreferenceDefinition>, PreferenceError> {
        self.definitions
            .get(key)
            .cloned()
            .ok_or_else(|| PreferenceError::UnknownPreference {
                scope: self.scope,
                key: key.clone(),
            })
    }

    pub fn get_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Arc<PreferenceDefinition>, PreferenceError> {
        self.get_key(&PreferenceKey::from_identifier(identifier))
    }

    pub fn contains(&self, section: Option<&str>, name: &str) -> bool {
        self.definitions
            .contains_key(&PreferenceKey::new(section, name))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<PreferenceDefinition>> {
        self.definitions.values()
    }

    pub fn sections(&self) -> BTreeSet<Option<&str>> {
        self.definitions
            .keys()
            .map(|key| key.section.as_deref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// One registry per scope, injected wherever records are built or loaded.
#[derive(Debug, Clone)]
pub struct PreferenceRegistries {
    global: Arc<PreferenceRegistry>,
    site: Arc<PreferenceRegistry>,
    user: Arc<PreferenceRegistry>,
}

impl PreferenceRegistries {
    pub fn new(
        global: PreferenceRegistry,
        site: PreferenceRegistry,
        user: PreferenceRegistry,
    ) -> Result<Self, PreferenceError> {
        for (expected, registry) in [
            (ScopeKind::Global, &global),
            (ScopeKind::Site, &site),
            (ScopeKind::User, &user),
        ] {
            if registry.scope() != expected {
                return Err(PreferenceError::ScopeMismatch {
                    expected,
                    found: registry.scope(),
                });
            }
        }

        Ok(Self {
            global: Arc::new(global),
            site: Arc::new(site),
            user: Arc::new(user),
        })
    }

    pub fn empty() -> Self {
        Self {
            global: Arc::new(PreferenceRegistry::new(ScopeKind::Global)),
            site: Arc::new(PreferenceRegistry::new(ScopeKind::Site)),
            user: Arc::new(PreferenceRegistry::new(ScopeKind::User)),
        }
    }

    pub fn for_scope(&self, scope: ScopeKind) -> &Arc<PreferenceRegistry> {
        match scope {
            ScopeKind::Global => &self.global,
            ScopeKind::Site => &self.site,
            ScopeKind::User => &self.user,
        }
    }

    pub fn global(&self) -> &Arc<PreferenceRegistry> {
        &self.global
    }

    pub fn site(&self) -> &Arc<PreferenceRegistry> {
        &self.site
    }

    pub fn user(&self) -> &Arc<PreferenceRegistry> {
        &self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{BooleanSerializer, StringSerializer};
    use crate::value::PreferenceValue;

    fn flag(section: Option<&str>, name: &str, default: bool) -> PreferenceDefinition {
        PreferenceDefinition::builder(section, name, BooleanSerializer)
            .default_value(default)
            .build()
            .expect("definition")
    }

    #[test]
    fn get_resolves_section_and_name() {
        let registry = PreferenceRegistry::new(ScopeKind::Global)
            .with(flag(Some("general"), "maintenance_mode", false))
            .expect("register")
            .with(flag(None, "beta", true))
            .expect("register");

        let definition = registry.get(Some("general"), "maintenance_mode").expect("known");
        assert_eq!(definition.default_value(), &PreferenceValue::Bool(false));
        assert!(registry.get(None, "beta").is_ok());
        assert!(registry.get_by_identifier("general__maintenance_mode").is_ok());
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.sections().into_iter().collect::<Vec<_>>(),
            vec![None, Some("general")]
        );
    }

    #[test]
    fn unknown_preference_is_a_lookup_error() {
        let registry = PreferenceRegistry::new(ScopeKind::User);
        let err = registry.get(Some("general"), "missing").expect_err("unknown");
        match err {
            PreferenceError::UnknownPreference { scope, key } => {
                assert_eq!(scope, ScopeKind::User);
                assert_eq!(key.identifier(), "general__missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PreferenceRegistry::new(ScopeKind::Site);
        registry.register(flag(Some("a"), "b", true)).expect("first");
        let err = registry
            .register(
                PreferenceDefinition::builder(Some("a"), "b", StringSerializer::new())
                    .default_value("x")
                    .build()
                    .expect("definition"),
            )
            .expect_err("duplicate");
        assert!(matches!(err, PreferenceError::DuplicateDefinition { .. }));
    }

    #[test]
    fn registries_must_match_their_slot() {
        let err = PreferenceRegistries::new(
            PreferenceRegistry::new(ScopeKind::Global),
            PreferenceRegistry::new(ScopeKind::User),
            PreferenceRegistry::new(ScopeKind::User),
        )
        .expect_err("site slot holds user registry");
        assert!(matches!(
            err,
            PreferenceError::ScopeMismatch {
                expected: ScopeKind::Site,
                found: ScopeKind::User
            }
        ));

        let registries = PreferenceRegistries::empty();
        assert_eq!(registries.for_scope(ScopeKind::User).scope(), ScopeKind::User);
    }
}
