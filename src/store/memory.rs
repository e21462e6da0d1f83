use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::execute::Executor;
use super::value::{equals, merge};
use super::{Connection, DriverError, Handle, Result};

pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub db: String,
    pub table: String,
}

impl TableRef {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            db: db.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.table)
    }
}

#[derive(Debug, Clone)]
struct Table {
    primary_key: String,
    documents: Vec<Value>,
}

impl Table {
    fn position(&self, key: &Value) -> Option<usize> {
        self.documents
            .iter()
            .position(|document| document.get(&self.primary_key).map_or(false, |found| equals(found, key)))
    }
}

/// Outcome of a write, serialized into the usual write summary object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteSummary {
    pub deleted: u64,
    pub errors: u64,
    pub inserted: u64,
    pub replaced: u64,
    pub skipped: u64,
    pub unchanged: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub generated_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<Value>>,
}

impl WriteSummary {
    pub fn error(&mut self, message: String) {
        self.errors += 1;
        self.first_error.get_or_insert(message);
    }

    pub fn change(&mut self, old_val: Option<&Value>, new_val: Option<&Value>) {
        if let Some(changes) = self.changes.as_mut() {
            changes.push(serde_json::json!({
                "old_val": old_val.cloned().unwrap_or(Value::Null),
                "new_val": new_val.cloned().unwrap_or(Value::Null),
            }));
        }
    }

    pub fn absorb(&mut self, other: WriteSummary) {
        self.deleted += other.deleted;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.skipped += other.skipped;
        self.unchanged += other.unchanged;
        self.errors += other.errors;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
        self.generated_keys.extend(other.generated_keys);
        if let Some(more) = other.changes {
            self.changes.get_or_insert_with(Vec::new).extend(more);
        }
    }
}

/// How `insert` treats a document whose primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Error,
    Replace,
    Update,
}

impl Conflict {
    pub fn parse(name: &str) -> Result<Conflict> {
        match name {
            "error" => Ok(Conflict::Error),
            "replace" => Ok(Conflict::Replace),
            "update" => Ok(Conflict::Update),
            other => Err(DriverError::Runtime(format!("Conflict option `{}` unrecognized.", other))),
        }
    }
}

/// A document-level change computed outside of the store lock.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Put(Value),
    Remove(Value),
}

type Databases = BTreeMap<String, BTreeMap<String, Table>>;

/// Databases of JSON documents held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<Databases>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_table(self, db: &str, table: &str, documents: Vec<Value>) -> Result<Self> {
        self.create_table(db, table, DEFAULT_PRIMARY_KEY)?;
        self.apply(&TableRef::new(db, table), documents.into_iter().map(Write::Put).collect())?;
        Ok(self)
    }

    pub fn create_table(&self, db: &str, table: &str, primary_key: &str) -> Result<()> {
        debug!("creating table {}.{} keyed by {}", db, table, primary_key);
        self.write_lock()?.entry(db.to_string()).or_default().insert(
            table.to_string(),
            Table {
                primary_key: primary_key.to_string(),
                documents: vec![],
            },
        );
        Ok(())
    }

    /// Loads `<dir>/<db>/<table>.json`, each file a JSON array of documents.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let store = MemoryStore::new();
        for db in fs::read_dir(path.as_ref())? {
            let db = db?;
            if !db.file_type()?.is_dir() {
                continue;
            }
            let db_name = db.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(db.path())? {
                let file = file?.path();
                if file.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                let Some(table) = file.file_stem().and_then(|stem| stem.to_str()) else { continue };
                let documents: Vec<Value> = serde_json::from_str(&fs::read_to_string(&file)?)?;
                info!("Loading {} documents into {}.{}", documents.len(), db_name, table);
                store.create_table(&db_name, table, DEFAULT_PRIMARY_KEY)?;
                store.apply(&TableRef::new(db_name.as_str(), table), documents.into_iter().map(Write::Put).collect())?;
            }
        }
        Ok(store)
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Databases>> {
        self.databases
            .read()
            .map_err(|_| DriverError::Runtime("store lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Databases>> {
        self.databases
            .write()
            .map_err(|_| DriverError::Runtime("store lock poisoned".to_string()))
    }

    pub fn has_database(&self, db: &str) -> Result<bool> {
        Ok(self.read_lock()?.contains_key(db))
    }

    fn with_table_ref<T>(&self, table: &TableRef, f: impl FnOnce(&Table) -> T) -> Result<T> {
        let databases = self.read_lock()?;
        let tables = databases
            .get(&table.db)
            .ok_or_else(|| DriverError::NotFound(format!("Database `{}` does not exist.", table.db)))?;
        let found = tables
            .get(&table.table)
            .ok_or_else(|| DriverError::NotFound(format!("Table `{}` does not exist.", table)))?;
        Ok(f(found))
    }

    fn with_table_mut<T>(&self, table: &TableRef, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let mut databases = self.write_lock()?;
        let found = databases
            .get_mut(&table.db)
            .and_then(|tables| tables.get_mut(&table.table))
            .ok_or_else(|| DriverError::NotFound(format!("Table `{}` does not exist.", table)))?;
        Ok(f(found))
    }

    pub fn documents(&self, table: &TableRef) -> Result<Vec<Value>> {
        self.with_table_ref(table, |found| found.documents.clone())
    }

    pub fn primary_key(&self, table: &TableRef) -> Result<String> {
        self.with_table_ref(table, |found| found.primary_key.clone())
    }

    pub fn get(&self, table: &TableRef, key: &Value) -> Result<Option<Value>> {
        self.with_table_ref(table, |found| found.position(key).map(|at| found.documents[at].clone()))
    }

    pub fn insert(&self, table: &TableRef, documents: Vec<Value>, conflict: Conflict, return_changes: bool) -> Result<WriteSummary> {
        let mut summary = WriteSummary {
            changes: return_changes.then(Vec::new),
            ..WriteSummary::default()
        };
        self.with_table_mut(table, |target| {
            for document in documents {
                let mut fields = match document {
                    Value::Object(fields) => fields,
                    other => {
                        summary.error(format!("Expected type OBJECT but found {}.", other));
                        continue;
                    }
                };
                if !fields.contains_key(&target.primary_key) {
                    let key = Uuid::new_v4().to_string();
                    fields.insert(target.primary_key.clone(), Value::String(key.clone()));
                    summary.generated_keys.push(key);
                }
                let document = Value::Object(fields);
                let key = document[&target.primary_key].clone();
                match (target.position(&key), conflict) {
                    (None, _) => {
                        summary.change(None, Some(&document));
                        target.documents.push(document);
                        summary.inserted += 1;
                    }
                    (Some(_), Conflict::Error) => {
                        summary.error(format!("Duplicate primary key `{}`: {}", target.primary_key, key));
                    }
                    (Some(at), conflict) => {
                        let old = target.documents[at].clone();
                        let new = match conflict {
                            Conflict::Update => merge(old.clone(), document),
                            _ => document,
                        };
                        if old == new {
                            summary.unchanged += 1;
                        } else {
                            summary.change(Some(&old), Some(&new));
                            target.documents[at] = new;
                            summary.replaced += 1;
                        }
                    }
                }
            }
        })?;
        Ok(summary)
    }

    /// Applies precomputed writes in order; puts replace by primary key or append.
    pub fn apply(&self, table: &TableRef, writes: Vec<Write>) -> Result<()> {
        self.with_table_mut(table, |target| {
            for write in writes {
                match write {
                    Write::Put(document) => {
                        let key = document.get(&target.primary_key).cloned().unwrap_or(Value::Null);
                        match target.position(&key) {
                            Some(at) => target.documents[at] = document,
                            None => target.documents.push(document),
                        }
                    }
                    Write::Remove(key) => {
                        if let Some(at) = target.position(&key) {
                            target.documents.remove(at);
                        }
                    }
                }
            }
        })
    }
}

impl Connection for MemoryStore {
    fn run(&self, query: &Handle) -> Result<Value> {
        Executor::new(self).run(query)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_table("test", "people", vec![json!({"id": 1, "name": "annie"}), json!({"id": 2, "name": "stan"})])
            .unwrap()
    }

    #[test]
    fn reads_documents() {
        let store = store();
        let people = TableRef::new("test", "people");
        assert_eq!(store.documents(&people).unwrap().len(), 2);
        assert_eq!(store.get(&people, &json!(2)).unwrap(), Some(json!({"id": 2, "name": "stan"})));
        assert_eq!(store.get(&people, &json!(3)).unwrap(), None);
        assert!(matches!(store.documents(&TableRef::new("test", "nobody")), Err(DriverError::NotFound(_))));
    }

    #[test]
    fn insert_generates_keys_and_detects_conflicts() {
        let store = store();
        let people = TableRef::new("test", "people");
        let summary = store
            .insert(&people, vec![json!({"name": "tc"}), json!({"id": 1, "name": "wei"})], Conflict::Error, false)
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.generated_keys.len(), 1);
        assert_eq!(store.documents(&people).unwrap().len(), 3);

        let summary = store.insert(&people, vec![json!({"id": 1, "age": 30})], Conflict::Update, true).unwrap();
        assert_eq!(summary.replaced, 1);
        assert_eq!(store.get(&people, &json!(1)).unwrap(), Some(json!({"id": 1, "name": "annie", "age": 30})));
        assert_eq!(summary.changes.map(|changes| changes.len()), Some(1));
    }

    #[test]
    fn applies_writes() {
        let store = store();
        let people = TableRef::new("test", "people");
        store
            .apply(&people, vec![Write::Remove(json!(1)), Write::Put(json!({"id": 2, "name": "noel"}))])
            .unwrap();
        assert_eq!(store.documents(&people).unwrap(), vec![json!({"id": 2, "name": "noel"})]);
    }

    #[test]
    fn summary_serializes_without_empty_extras() {
        let summary = WriteSummary {
            inserted: 2,
            ..WriteSummary::default()
        };
        assert_eq!(
            serde_json::to_value(summary).unwrap(),
            json!({"deleted": 0, "errors": 0, "inserted": 2, "replaced": 0, "skipped": 0, "unchanged": 0})
        );
    }

    #[test]
    fn summaries_absorb() {
        let mut total = WriteSummary::default();
        let first: WriteSummary = serde_json::from_value(json!({"inserted": 1, "generated_keys": ["a"]})).unwrap();
        let second: WriteSummary =
            serde_json::from_value(json!({"errors": 1, "first_error": "boom", "changes": [{"old_val": null, "new_val": 1}]}))
                .unwrap();
        total.absorb(first);
        total.absorb(second);
        assert_eq!(total.inserted, 1);
        assert_eq!(total.errors, 1);
        assert_eq!(total.first_error.as_deref(), Some("boom"));
        assert_eq!(total.generated_keys, vec!["a".to_string()]);
        assert_eq!(total.changes.map(|changes| changes.len()), Some(1));
    }
}
