//! The preference record: one stored value for one definition at one scope.
//!
//! A record only keeps coordinates (`section`, `name`) into its registry and
//! the serialized `raw_value`. Typed access goes through [`PreferenceRecord::value`]
//! and [`PreferenceRecord::set_value`], which resolve the definition once per
//! instance and run its serializer.

use crate::definition::{PreferenceDefinition, PreferenceKey};
use crate::registry::PreferenceRegistry;
use crate::scope::{GlobalScope, Scope, SiteId, SiteScope, UserId, UserScope};
use crate::serializer::DeserializationError;
use crate::value::PreferenceValue;
use crate::PreferenceError;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

pub type GlobalPreference = PreferenceRecord<GlobalScope>;
pub type SitePreference = PreferenceRecord<SiteScope>;
pub type UserPreference = PreferenceRecord<UserScope>;

pub struct PreferenceRecord<S: Scope> {
    id: Option<i64>,
    owner: S::Owner,
    section: Option<String>,
    name: String,
    raw_value: Option<String>,
    registry: Arc<PreferenceRegistry>,
    definition: OnceCell<Arc<PreferenceDefinition>>,
}

impl<S: Scope> PreferenceRecord<S> {
    /// Builds a record that has not been persisted yet.
    ///
    /// `raw_value` is filled immediately: from `value` when given, otherwise
    /// from the definition default. Nothing is written to storage.
    pub fn new(
        registry: Arc<PreferenceRegistry>,
        owner: S::Owner,
        section: Option<&str>,
        name: &str,
        value: Option<PreferenceValue>,
    ) -> Result<Self, PreferenceError> {
        if registry.scope() != S::KIND {
            return Err(PreferenceError::ScopeMismatch {
                expected: S::KIND,
                found: registry.scope(),
            });
        }

        let mut record = Self {
            id: None,
            owner,
            section: section.map(str::to_string),
            name: name.to_string(),
            raw_value: None,
            registry,
            definition: OnceCell::new(),
        };

        match value {
            Some(value) => record.set_value(value)?,
            None => {
                let default = record.definition()?.default_value().clone();
                record.set_value(default)?;
            }
        }

        Ok(record)
    }

    /// Rehydrates a row loaded from storage. Defaults are never applied here,
    /// so a stored value survives even if the definition default changes.
    pub fn from_stored(
        registry: Arc<PreferenceRegistry>,
        id: i64,
        owner: S::Owner,
        section: Option<String>,
        name: String,
        raw_value: Option<String>,
    ) -> Self {
        Self {
            id: Some(id),
            owner,
            section,
            name,
            raw_value,
            registry,
            definition: OnceCell::new(),
        }
    }

    pub fn definition(&self) -> Result<Arc<PreferenceDefinition>, PreferenceError> {
        if let Some(definition) = self.definition.get() {
            return Ok(Arc::clone(definition));
        }
        let definition = self.registry.get(self.section(), &self.name)?;
        let _ = self.definition.set(Arc::clone(&definition));
        Ok(definition)
    }

    pub fn value(&self) -> Result<PreferenceValue, PreferenceError> {
        let definition = self.definition()?;
        let Some(raw) = self.raw_value.as_deref() else {
            return Err(PreferenceError::Deserialization {
                key: self.key(),
                source: DeserializationError::new(
                    definition.serializer().name(),
                    "",
                    "stored value is null",
                ),
            });
        };
        definition.deserialize(raw)
    }

    /// Serializes `value` into `raw_value`. On error the stored text is untouched.
    pub fn set_value(&mut self, value: impl Into<PreferenceValue>) -> Result<(), PreferenceError> {
        let raw = self.definition()?.serialize(&value.into())?;
        self.raw_value = Some(raw);
        Ok(())
    }

    pub fn default_value(&self) -> Result<PreferenceValue, PreferenceError> {
        Ok(self.definition()?.default_value().clone())
    }

    pub fn reset_to_default(&mut self) -> Result<(), PreferenceError> {
        let default = self.default_value()?;
        self.set_value(default)
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Called by storage backends once the row has been inserted.
    pub fn mark_persisted(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> PreferenceKey {
        PreferenceKey::new(self.section(), &self.name)
    }

    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }

    pub fn owner(&self) -> S::Owner {
        self.owner
    }

    pub fn set_owner(&mut self, owner: S::Owner) {
        self.owner = owner;
    }

    pub fn registry(&self) -> &Arc<PreferenceRegistry> {
        &self.registry
    }
}

impl PreferenceRecord<SiteScope> {
    pub fn site(&self) -> SiteId {
        self.owner
    }

    pub fn set_site(&mut self, site: SiteId) {
        self.owner = site;
    }
}

impl PreferenceRecord<UserScope> {
    pub fn user(&self) -> UserId {
        self.owner
    }

    pub fn set_user(&mut self, user: UserId) {
        self.owner = user;
    }
}

impl<S: Scope> fmt::Display for PreferenceRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}/{}: {}",
            S::record_label(),
            self.section().unwrap_or("None"),
            self.name,
            self.raw_value().unwrap_or("None")
        )
    }
}

impl<S: Scope> fmt::Debug for PreferenceRecord<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::record_label())
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("section", &self.section)
            .field("name", &self.name)
            .field("raw_value", &self.raw_value)
            .finish()
    }
}
