use crate::StorageError;
use dynprefs_core::{PreferenceKey, PreferenceRecord, PreferenceRegistry, PreferenceValue, Scope};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

/// `{section: {name: value}}`; records without a section group under `None`.
pub type PreferenceMap = BTreeMap<Option<String>, BTreeMap<String, PreferenceValue>>;

type StoredRow = (i64, Option<i64>, Option<String>, String, Option<String>);

#[derive(Debug, Clone)]
pub struct PreferenceFilter<O> {
    section: Option<Option<String>>,
    name: Option<String>,
    owner: Option<O>,
}

impl<O> PreferenceFilter<O> {
    pub fn new() -> Self {
        Self {
            section: None,
            name: None,
            owner: None,
        }
    }

    pub fn section(mut self, section: &str) -> Self {
        self.section = Some(Some(section.to_string()));
        self
    }

    pub fn without_section(mut self) -> Self {
        self.section = Some(None);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn owner(mut self, owner: O) -> Self {
        self.owner = Some(owner);
        self
    }
}

impl<O> Default for PreferenceFilter<O> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PreferenceManager<'s, S: Scope> {
    conn: &'s Connection,
    registry: Arc<PreferenceRegistry>,
    scope: PhantomData<S>,
}

impl<'s, S: Scope> PreferenceManager<'s, S> {
    pub(crate) fn new(conn: &'s Connection, registry: Arc<PreferenceRegistry>) -> Self {
        Self {
            conn,
            registry,
            scope: PhantomData,
        }
    }

    pub fn registry(&self) -> &Arc<PreferenceRegistry> {
        &self.registry
    }

    pub fn new_record(
        &self,
        owner: S::Owner,
        section: Option<&str>,
        name: &str,
        value: Option<PreferenceValue>,
    ) -> Result<PreferenceRecord<S>, StorageError> {
        Ok(PreferenceRecord::new(
            Arc::clone(&self.registry),
            owner,
            section,
            name,
            value,
        )?)
    }

    pub fn save(&self, record: &mut PreferenceRecord<S>) -> Result<(), StorageError> {
        let table = S::KIND.table();
        let owner_id = S::owner_id(&record.owner());

        match record.id() {
            None => {
                let result = match owner_id {
                    Some(owner_id) => self.conn.execute(
                        &format!(
                            "
                            INSERT INTO {table} (instance_id, section, name, raw_value)
                            VALUES (?1, ?2, ?3, ?4)
                            "
                        ),
                        params![owner_id, record.section(), record.name(), record.raw_value()],
                    ),
                    None => self.conn.execute(
                        &format!(
                            "INSERT INTO {table} (section, name, raw_value) VALUES (?1, ?2, ?3)"
                        ),
                        params![record.section(), record.name(), record.raw_value()],
                    ),
                };
                result.map_err(|err| self.write_error(err, record.key(), owner_id))?;
                let id = self.conn.last_insert_rowid();
                record.mark_persisted(id);
                debug!(scope = S::KIND.as_str(), id, key = %record.key(), "inserted preference");
            }
            Some(id) => {
                let result = match owner_id {
                    Some(owner_id) => self.conn.execute(
                        &format!(
                            "
                            UPDATE {table}
                            SET instance_id = ?1, section = ?2, name = ?3, raw_value = ?4
                            WHERE id = ?5
                            "
                        ),
                        params![
                            owner_id,
                            record.section(),
                            record.name(),
                            record.raw_value(),
                            id
                        ],
                    ),
                    None => self.conn.execute(
                        &format!(
                            "
                            UPDATE {table}
                            SET section = ?1, name = ?2, raw_value = ?3
                            WHERE id = ?4
                            "
                        ),
                        params![record.section(), record.name(), record.raw_value(), id],
                    ),
                };
                let changes =
                    result.map_err(|err| self.write_error(err, record.key(), owner_id))?;
                if changes == 0 {
                    return Err(StorageError::MissingRecord { scope: S::KIND, id });
                }
                debug!(scope = S::KIND.as_str(), id, key = %record.key(), "updated preference");
            }
        }

        Ok(())
    }

    pub fn get(
        &self,
        owner: S::Owner,
        section: Option<&str>,
        name: &str,
    ) -> Result<Option<PreferenceRecord<S>>, StorageError> {
        let filter = PreferenceFilter::new().owner(owner).name(name);
        let filter = match section {
            Some(section) => filter.section(section),
            None => filter.without_section(),
        };
        Ok(self.filter(&filter)?.into_iter().next())
    }

    pub fn all(&self) -> Result<Vec<PreferenceRecord<S>>, StorageError> {
        self.filter(&PreferenceFilter::new())
    }

    pub fn filter(
        &self,
        filter: &PreferenceFilter<S::Owner>,
    ) -> Result<Vec<PreferenceRecord<S>>, StorageError> {
        let (clause, values) = self.where_clause(filter);
        let owner_column = if S::KIND.is_per_instance() {
            "instance_id"
        } else {
            "NULL"
        };
        let mut statement = self.conn.prepare(&format!(
            "SELECT id, {owner_column}, section, name, raw_value FROM {}{clause} ORDER BY id ASC",
            S::KIND.table()
        ))?;

        let rows = statement.query_map(params_from_iter(values), |row| {
            Ok::<StoredRow, rusqlite::Error>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, owner_id, section, name, raw_value) = row?;
            let owner = S::owner_from_id(owner_id)
                .ok_or(StorageError::InvalidOwner { scope: S::KIND, id })?;
            records.push(PreferenceRecord::from_stored(
                Arc::clone(&self.registry),
                id,
                owner,
                section,
                name,
                raw_value,
            ));
        }
        Ok(records)
    }

    pub fn count(&self, filter: &PreferenceFilter<S::Owner>) -> Result<i64, StorageError> {
        let (clause, values) = self.where_clause(filter);
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{clause}", S::KIND.table()),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Any record that fails to decode aborts the whole call.
    pub fn to_mapping(
        &self,
        filter: &PreferenceFilter<S::Owner>,
    ) -> Result<PreferenceMap, StorageError> {
        let mut mapping = PreferenceMap::new();
        for record in self.filter(filter)? {
            let value = record.value()?;
            mapping
                .entry(record.section().map(str::to_string))
                .or_default()
                .insert(record.name().to_string(), value);
        }
        Ok(mapping)
    }

    pub fn delete(&self, record: &PreferenceRecord<S>) -> Result<bool, StorageError> {
        let Some(id) = record.id() else {
            return Ok(false);
        };
        let changes = self.conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", S::KIND.table()),
            [id],
        )?;
        debug!(scope = S::KIND.as_str(), id, "deleted preference");
        Ok(changes > 0)
    }

    /// Always 0 for the global scope, which has no owner.
    pub fn delete_for_owner(&self, owner: S::Owner) -> Result<usize, StorageError> {
        let Some(owner_id) = S::owner_id(&owner) else {
            return Ok(0);
        };
        let removed = self.conn.execute(
            &format!("DELETE FROM {} WHERE instance_id = ?1", S::KIND.table()),
            [owner_id],
        )?;
        info!(scope = S::KIND.as_str(), owner_id, removed, "removed owner preferences");
        Ok(removed)
    }

    /// Existing rows for the owner are kept. Returns the number inserted.
    pub fn create_default_preferences(&self, owner: S::Owner) -> Result<usize, StorageError> {
        let table = S::KIND.table();
        let owner_id = S::owner_id(&owner);
        let tx = self.conn.unchecked_transaction()?;

        let mut inserted = 0;
        for definition in self.registry.definitions() {
            let record = PreferenceRecord::<S>::new(
                Arc::clone(&self.registry),
                owner,
                definition.section(),
                definition.name(),
                None,
            )?;
            inserted += match owner_id {
                Some(owner_id) => tx.execute(
                    &format!(
                        "
                        INSERT OR IGNORE INTO {table} (instance_id, section, name, raw_value)
                        VALUES (?1, ?2, ?3, ?4)
                        "
                    ),
                    params![owner_id, record.section(), record.name(), record.raw_value()],
                )?,
                None => tx.execute(
                    &format!(
                        "
                        INSERT OR IGNORE INTO {table} (section, name, raw_value)
                        VALUES (?1, ?2, ?3)
                        "
                    ),
                    params![record.section(), record.name(), record.raw_value()],
                )?,
            };
        }
        tx.commit()?;

        info!(
            scope = S::KIND.as_str(),
            owner = ?owner,
            inserted,
            registered = self.registry.len(),
            "created default preferences"
        );
        Ok(inserted)
    }

    fn where_clause(&self, filter: &PreferenceFilter<S::Owner>) -> (String, Vec<SqlValue>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(owner_id) = filter.owner.as_ref().and_then(S::owner_id) {
            clauses.push("instance_id = ?");
            values.push(SqlValue::Integer(owner_id));
        }
        match &filter.section {
            Some(Some(section)) => {
                clauses.push("section = ?");
                values.push(SqlValue::Text(section.clone()));
            }
            Some(None) => clauses.push("section IS NULL"),
            None => {}
        }
        if let Some(name) = &filter.name {
            clauses.push("name = ?");
            values.push(SqlValue::Text(name.clone()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }

    fn write_error(
        &self,
        err: rusqlite::Error,
        key: PreferenceKey,
        owner: Option<i64>,
    ) -> StorageError {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return StorageError::UniqueViolation {
                    scope: S::KIND,
                    key,
                    owner,
                };
            }
        }
        StorageError::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PreferenceStore;
    use dynprefs_core::{
        BooleanSerializer, IntegerSerializer, PreferenceDefinition, PreferenceError,
        PreferenceRegistries, PreferenceRegistry, ScopeKind, StringSerializer, UserId,
    };

    fn definition(
        section: Option<&str>,
        name: &str,
        default: impl Into<PreferenceValue>,
    ) -> PreferenceDefinition {
        let default = default.into();
        let builder = match &default {
            PreferenceValue::Bool(_) => {
                PreferenceDefinition::builder(section, name, BooleanSerializer)
            }
            PreferenceValue::Int(_) => {
                PreferenceDefinition::builder(section, name, IntegerSerializer::new())
            }
            _ => PreferenceDefinition::builder(section, name, StringSerializer::new()),
        };
        builder.default_value(default).build().expect("definition")
    }

    fn store() -> PreferenceStore {
        let global = PreferenceRegistry::new(ScopeKind::Global)
            .with(definition(Some("s1"), "n1", 1))
            .expect("register")
            .with(definition(Some("s1"), "n2", true))
            .expect("register")
            .with(definition(Some("s2"), "n3", "three"))
            .expect("register")
            .with(definition(None, "orphan", false))
            .expect("register");
        let user = PreferenceRegistry::new(ScopeKind::User)
            .with(definition(Some("display"), "theme", "light"))
            .expect("register")
            .with(definition(Some("display"), "items_per_page", 25))
            .expect("register");
        let registries =
            PreferenceRegistries::new(global, PreferenceRegistry::new(ScopeKind::Site), user)
                .expect("registries");
        PreferenceStore::open_in_memory(registries).expect("open db")
    }

    #[test]
    fn save_inserts_then_updates() {
        let store = store();
        let manager = store.global();
        let mut record = manager
            .new_record((), Some("s1"), "n1", None)
            .expect("record");
        manager.save(&mut record).expect("insert");
        let id = record.id().expect("persisted id");

        record.set_value(9).expect("set");
        manager.save(&mut record).expect("update");
        assert_eq!(record.id(), Some(id));

        let loaded = manager
            .get((), Some("s1"), "n1")
            .expect("query")
            .expect("present");
        assert_eq!(loaded.raw_value(), Some("9"));
        assert_eq!(manager.count(&PreferenceFilter::new()).expect("count"), 1);
    }

    #[test]
    fn to_mapping_groups_by_section_then_name() {
        let store = store();
        let manager = store.global();
        for (section, name, value) in [
            (Some("s1"), "n1", PreferenceValue::Int(10)),
            (Some("s1"), "n2", PreferenceValue::Bool(false)),
            (Some("s2"), "n3", PreferenceValue::from("v3")),
            (None, "orphan", PreferenceValue::Bool(true)),
        ] {
            let mut record = manager
                .new_record((), section, name, Some(value))
                .expect("record");
            manager.save(&mut record).expect("save");
        }

        let mapping = manager.to_mapping(&PreferenceFilter::new()).expect("mapping");
        let mut expected = PreferenceMap::new();
        expected
            .entry(Some("s1".to_string()))
            .or_default()
            .extend([
                ("n1".to_string(), PreferenceValue::Int(10)),
                ("n2".to_string(), PreferenceValue::Bool(false)),
            ]);
        expected
            .entry(Some("s2".to_string()))
            .or_default()
            .insert("n3".to_string(), PreferenceValue::from("v3"));
        expected
            .entry(None)
            .or_default()
            .insert("orphan".to_string(), PreferenceValue::Bool(true));
        assert_eq!(mapping, expected);

        let only_s1 = manager
            .to_mapping(&PreferenceFilter::new().section("s1"))
            .expect("filtered mapping");
        assert_eq!(only_s1.len(), 1);
        assert_eq!(only_s1[&Some("s1".to_string())].len(), 2);

        let no_section = manager
            .to_mapping(&PreferenceFilter::new().without_section())
            .expect("null section mapping");
        assert_eq!(no_section.keys().collect::<Vec<_>>(), vec![&None]);
    }

    #[test]
    fn to_mapping_is_all_or_nothing_on_corrupt_rows() {
        let store = store();
        let manager = store.global();
        let mut record = manager
            .new_record((), Some("s1"), "n1", None)
            .expect("record");
        manager.save(&mut record).expect("save");
        store
            .conn
            .execute(
                "UPDATE global_preferences SET raw_value = 'not-a-number' WHERE name = 'n1'",
                [],
            )
            .expect("corrupt row");

        let err = manager
            .to_mapping(&PreferenceFilter::new())
            .expect_err("corrupt row aborts");
        assert!(matches!(
            err,
            StorageError::Preference(PreferenceError::Deserialization { .. })
        ));
    }

    #[test]
    fn duplicate_global_record_is_rejected_by_storage() {
        let store = store();
        let manager = store.global();
        let mut first = manager
            .new_record((), Some("s1"), "n2", None)
            .expect("record");
        manager.save(&mut first).expect("first insert");

        let mut second = manager
            .new_record((), Some("s1"), "n2", Some(PreferenceValue::Bool(false)))
            .expect("record");
        let err = manager.save(&mut second).expect_err("duplicate");
        assert!(matches!(
            err,
            StorageError::UniqueViolation {
                scope: ScopeKind::Global,
                owner: None,
                ..
            }
        ));
        assert!(!second.is_persisted());
    }

    #[test]
    fn duplicate_null_section_record_is_rejected_by_storage() {
        let store = store();
        let manager = store.global();
        for attempt in 0..2 {
            let mut record = manager
                .new_record((), None, "orphan", None)
                .expect("record");
            let result = manager.save(&mut record);
            if attempt == 0 {
                result.expect("first insert");
            } else {
                assert!(matches!(result, Err(StorageError::UniqueViolation { .. })));
            }
        }
    }

    #[test]
    fn per_owner_uniqueness_allows_same_key_for_other_owners() {
        let store = store();
        let manager = store.user();
        let mut first = manager
            .new_record(UserId(1), Some("display"), "theme", None)
            .expect("record");
        manager.save(&mut first).expect("user 1");
        let mut second = manager
            .new_record(UserId(2), Some("display"), "theme", None)
            .expect("record");
        manager.save(&mut second).expect("user 2");

        let mut duplicate = manager
            .new_record(UserId(1), Some("display"), "theme", None)
            .expect("record");
        assert!(matches!(
            manager.save(&mut duplicate),
            Err(StorageError::UniqueViolation {
                owner: Some(1),
                ..
            })
        ));

        let user_two = manager
            .filter(&PreferenceFilter::new().owner(UserId(2)))
            .expect("filter");
        assert_eq!(user_two.len(), 1);
        assert_eq!(user_two[0].user(), UserId(2));
    }

    #[test]
    fn loaded_records_do_not_reapply_defaults() {
        let store = store();
        let manager = store.user();
        let mut record = manager
            .new_record(
                UserId(4),
                Some("display"),
                "items_per_page",
                Some(PreferenceValue::Int(60)),
            )
            .expect("record");
        manager.save(&mut record).expect("save");

        let loaded = manager
            .get(UserId(4), Some("display"), "items_per_page")
            .expect("query")
            .expect("present");
        assert!(loaded.is_persisted());
        assert_eq!(loaded.value().expect("value"), PreferenceValue::Int(60));
        assert!(manager
            .get(UserId(5), Some("display"), "items_per_page")
            .expect("query")
            .is_none());
    }

    #[test]
    fn create_default_preferences_is_idempotent() {
        let store = store();
        let manager = store.user();
        assert_eq!(
            manager.create_default_preferences(UserId(3)).expect("create"),
            2
        );

        let mut theme = manager
            .get(UserId(3), Some("display"), "theme")
            .expect("query")
            .expect("present");
        theme.set_value("dark").expect("set");
        manager.save(&mut theme).expect("save");

        assert_eq!(
            manager.create_default_preferences(UserId(3)).expect("again"),
            0
        );
        let mapping = manager
            .to_mapping(&PreferenceFilter::new().owner(UserId(3)))
            .expect("mapping");
        assert_eq!(
            mapping[&Some("display".to_string())]["theme"],
            PreferenceValue::from("dark")
        );
        assert_eq!(
            mapping[&Some("display".to_string())]["items_per_page"],
            PreferenceValue::Int(25)
        );
    }

    #[test]
    fn delete_and_delete_for_owner() {
        let store = store();
        let manager = store.user();
        manager.create_default_preferences(UserId(1)).expect("user 1");
        manager.create_default_preferences(UserId(2)).expect("user 2");

        let theme = manager
            .get(UserId(1), Some("display"), "theme")
            .expect("query")
            .expect("present");
        assert!(manager.delete(&theme).expect("delete"));
        assert!(!manager.delete(&theme).expect("already gone"));

        assert_eq!(manager.delete_for_owner(UserId(1)).expect("cascade"), 1);
        assert_eq!(manager.all().expect("all").len(), 2);
        assert_eq!(store.global().delete_for_owner(()).expect("global"), 0);
    }

    #[test]
    fn update_of_vanished_row_reports_missing_record() {
        let store = store();
        let manager = store.global();
        let mut record = manager
            .new_record((), Some("s1"), "n1", None)
            .expect("record");
        manager.save(&mut record).expect("insert");
        manager.delete(&record).expect("delete");

        let err = manager.save(&mut record).expect_err("row gone");
        assert!(matches!(err, StorageError::MissingRecord { .. }));
    }
}
