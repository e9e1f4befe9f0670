use crate::config::StoreConfig;
use crate::lifecycle::{OwnerChange, OwnerEvent, OwnerEventHandler};
use crate::{PreferenceStore, StorageError};
use dynprefs_core::{ScopeKind, SiteId, UserId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Entity type name -> per-instance scope whose registry provisions it.
///
/// Built once at startup; there is no way to add bindings afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerTypeIndex {
    bindings: BTreeMap<String, ScopeKind>,
}

impl OwnerTypeIndex {
    pub fn new<I, T>(bindings: I) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = (T, ScopeKind)>,
        T: Into<String>,
    {
        let mut index = BTreeMap::new();
        for (entity_type, scope) in bindings {
            let entity_type = entity_type.into();
            if !scope.is_per_instance() {
                return Err(StorageError::InvalidOwnerBinding { entity_type, scope });
            }
            index.insert(entity_type, scope);
        }
        Ok(Self { bindings: index })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StorageError> {
        Self::new(
            config
                .owner_types
                .iter()
                .map(|(entity_type, scope)| (entity_type.clone(), *scope)),
        )
    }

    pub fn scope_for(&self, entity_type: &str) -> Option<ScopeKind> {
        self.bindings.get(entity_type).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Lifecycle handler that materializes default preferences for new owners
/// and drops an owner's preferences when the owner is deleted.
pub struct PreferenceProvisioner<'s> {
    store: &'s PreferenceStore,
    index: OwnerTypeIndex,
    create_defaults: bool,
}

impl<'s> PreferenceProvisioner<'s> {
    pub fn new(store: &'s PreferenceStore, index: OwnerTypeIndex) -> Self {
        Self {
            store,
            index,
            create_defaults: true,
        }
    }

    pub fn from_config(
        store: &'s PreferenceStore,
        config: &StoreConfig,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            store,
            index: OwnerTypeIndex::from_config(config)?,
            create_defaults: config.create_default_preferences,
        })
    }

    pub fn index(&self) -> &OwnerTypeIndex {
        &self.index
    }

    fn provision(&self, scope: ScopeKind, owner_id: i64) -> Result<usize, StorageError> {
        match scope {
            ScopeKind::Site => self.store.site().create_default_preferences(SiteId(owner_id)),
            ScopeKind::User => self.store.user().create_default_preferences(UserId(owner_id)),
            ScopeKind::Global => Ok(0),
        }
    }

    fn remove(&self, scope: ScopeKind, owner_id: i64) -> Result<usize, StorageError> {
        match scope {
            ScopeKind::Site => self.store.site().delete_for_owner(SiteId(owner_id)),
            ScopeKind::User => self.store.user().delete_for_owner(UserId(owner_id)),
            ScopeKind::Global => Ok(0),
        }
    }
}

impl OwnerEventHandler for PreferenceProvisioner<'_> {
    fn handle(&self, event: &OwnerEvent) -> Result<(), StorageError> {
        let Some(scope) = self.index.scope_for(&event.entity_type) else {
            debug!(
                entity_type = %event.entity_type,
                change = event.change.as_str(),
                "no preference registry bound to entity type"
            );
            return Ok(());
        };

        match event.change {
            OwnerChange::Created if self.create_defaults => {
                let inserted = self.provision(scope, event.owner_id)?;
                info!(
                    entity_type = %event.entity_type,
                    owner_id = event.owner_id,
                    inserted,
                    "provisioned default preferences"
                );
            }
            OwnerChange::Created | OwnerChange::Updated => {}
            OwnerChange::Deleted => {
                self.remove(scope, event.owner_id)?;
            }
        }
        Ok(())
    }
}
