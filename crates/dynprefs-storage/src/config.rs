use crate::StorageError;
use dynprefs_core::ScopeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_ENTITY: &str = "auth.user";
pub const DEFAULT_SITE_ENTITY: &str = "sites.site";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file; `None` keeps the store in memory.
    pub database_path: Option<PathBuf>,
    /// Write default rows when a bound owner entity is created.
    pub create_default_preferences: bool,
    /// Owner entity type name -> per-instance scope.
    pub owner_types: BTreeMap<String, ScopeKind>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mut owner_types = BTreeMap::new();
        owner_types.insert(DEFAULT_USER_ENTITY.to_string(), ScopeKind::User);
        owner_types.insert(DEFAULT_SITE_ENTITY.to_string(), ScopeKind::Site);

        Self {
            database_path: None,
            create_default_preferences: true,
            owner_types,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, StorageError> {
        toml::from_str(contents).map_err(|err| StorageError::Config(err.to_string()))
    }

    /// Reads a TOML config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|err| StorageError::Config(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_bind_user_and_site_entities() {
        let config = StoreConfig::default();
        assert!(config.create_default_preferences);
        assert_eq!(config.owner_types.get("auth.user"), Some(&ScopeKind::User));
        assert_eq!(config.owner_types.get("sites.site"), Some(&ScopeKind::Site));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn toml_overrides_and_keeps_missing_fields_default() {
        let config = StoreConfig::from_toml_str(
            r#"
            database_path = "/var/lib/app/preferences.db"

            [owner_types]
            "accounts.member" = "user"
            "#,
        )
        .expect("parse config");
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/app/preferences.db"))
        );
        assert!(config.create_default_preferences);
        assert_eq!(config.owner_types.len(), 1);
        assert_eq!(
            config.owner_types.get("accounts.member"),
            Some(&ScopeKind::User)
        );
    }

    #[test]
    fn invalid_scope_name_is_a_config_error() {
        let err = StoreConfig::from_toml_str("[owner_types]\n\"x\" = \"tenant\"\n")
            .expect_err("unknown scope");
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn load_reads_file_or_falls_back_to_defaults() {
        let missing = StoreConfig::load(Path::new("/nonexistent/dynprefs.toml")).expect("defaults");
        assert_eq!(missing, StoreConfig::default());

        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "create_default_preferences = false").expect("write config");
        let loaded = StoreConfig::load(file.path()).expect("load config");
        assert!(!loaded.create_default_preferences);
    }
}
