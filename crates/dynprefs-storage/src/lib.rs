pub mod config;
pub mod lifecycle;
pub mod manager;
pub mod provisioning;

pub use config::StoreConfig;
pub use lifecycle::{OwnerChange, OwnerEvent, OwnerEventHandler, OwnerLifecycle};
pub use manager::{PreferenceFilter, PreferenceManager, PreferenceMap};
pub use provisioning::{OwnerTypeIndex, PreferenceProvisioner};

use dynprefs_core::{
    GlobalScope, PreferenceError, PreferenceKey, PreferenceRegistries, ScopeKind, SiteScope,
    UserScope,
};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const PREFERENCES_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("preference error: {0}")]
    Preference(#[from] PreferenceError),
    #[error("{scope} preference {key} already exists (owner {owner:?})")]
    UniqueViolation {
        scope: ScopeKind,
        key: PreferenceKey,
        owner: Option<i64>,
    },
    #[error("{scope} preference row {id} no longer exists")]
    MissingRecord { scope: ScopeKind, id: i64 },
    #[error("{scope} preference row {id} has an invalid owner reference")]
    InvalidOwner { scope: ScopeKind, id: i64 },
    #[error("entity type {entity_type} cannot own {scope} preferences")]
    InvalidOwnerBinding {
        entity_type: String,
        scope: ScopeKind,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

pub struct PreferenceStore {
    conn: Connection,
    registries: PreferenceRegistries,
}

impl PreferenceStore {
    pub fn open(
        path: impl AsRef<Path>,
        registries: PreferenceRegistries,
    ) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn, registries };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory(registries: PreferenceRegistries) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, registries };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_with_config(
        config: &StoreConfig,
        registries: PreferenceRegistries,
    ) -> Result<Self, StorageError> {
        match &config.database_path {
            Some(path) => Self::open(path, registries),
            None => Self::open_in_memory(registries),
        }
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > PREFERENCES_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: PREFERENCES_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_preferences.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
            info!(from = current, to = 1, "migrated preference schema");
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn registries(&self) -> &PreferenceRegistries {
        &self.registries
    }

    pub fn global(&self) -> PreferenceManager<'_, GlobalScope> {
        PreferenceManager::new(&self.conn, Arc::clone(self.registries.global()))
    }

    pub fn site(&self) -> PreferenceManager<'_, SiteScope> {
        PreferenceManager::new(&self.conn, Arc::clone(self.registries.site()))
    }

    pub fn user(&self) -> PreferenceManager<'_, UserScope> {
        PreferenceManager::new(&self.conn, Arc::clone(self.registries.user()))
    }
}
