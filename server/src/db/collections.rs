//! Record storage keyed by collection name.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use syncstore_engine::{Pagination, Record};
use uuid::Uuid;

/// Field holding the server-assigned record id.
pub const ID_FIELD: &str = "id";

/// Field holding the last write time, in milliseconds since the epoch.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// All collections, each an insertion-ordered list of records.
#[derive(Debug, Default)]
pub struct Collections {
    collections: DashMap<String, Vec<Record>>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn has_id(record: &Record, id: &str) -> bool {
    record.get(ID_FIELD).and_then(Value::as_str) == Some(id)
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A page of a collection. Unknown collections are empty.
    pub fn list(&self, collection: &str, page: Pagination) -> Vec<Record> {
        self.collections
            .get(collection)
            .map(|records| page.slice(records.as_slice()))
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections
            .get(collection)?
            .iter()
            .find(|record| has_id(record, id))
            .cloned()
    }

    /// Stores a new record under a fresh id, creating the collection on
    /// first use. Any client-supplied id is replaced.
    pub fn insert(&self, collection: &str, mut record: Record) -> Record {
        let id = Uuid::new_v4().to_string();
        record.insert(ID_FIELD.to_string(), Value::from(id.clone()));
        record.insert(UPDATED_AT_FIELD.to_string(), Value::from(now_ms()));

        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record.clone());
        tracing::debug!(collection, %id, "record created");
        record
    }

    /// Replaces the record with `id`, keeping its position.
    pub fn replace(&self, collection: &str, id: &str, mut record: Record) -> Option<Record> {
        let mut records = self.collections.get_mut(collection)?;
        let stored = records.iter_mut().find(|record| has_id(record, id))?;

        record.insert(ID_FIELD.to_string(), Value::from(id));
        record.insert(UPDATED_AT_FIELD.to_string(), Value::from(now_ms()));
        *stored = record.clone();
        tracing::debug!(collection, id, "record replaced");
        Some(record)
    }

    /// Removes the record with `id`. Returns false if there was none.
    pub fn remove(&self, collection: &str, id: &str) -> bool {
        let Some(mut records) = self.collections.get_mut(collection) else {
            return false;
        };
        let before = records.len();
        records.retain(|record| !has_id(record, id));
        let removed = records.len() != before;
        if removed {
            tracing::debug!(collection, id, "record deleted");
        }
        removed
    }

    /// Record count of every collection, by name.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.collections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map_or(0, |records| records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_assigns_id_and_timestamp() {
        let db = Collections::new();
        let created = db.insert("todos", record(json!({"id": "mine", "title": "a"})));

        let id = created[ID_FIELD].as_str().unwrap();
        assert_ne!(id, "mine");
        assert!(Uuid::parse_str(id).is_ok());
        assert!(created[UPDATED_AT_FIELD].as_i64().unwrap() > 0);
        assert_eq!(db.get("todos", id), Some(created.clone()));
        assert_eq!(db.len("todos"), 1);
    }

    #[test]
    fn collections_are_independent() {
        let db = Collections::new();
        let todo = db.insert("todos", record(json!({"title": "a"})));
        let id = todo[ID_FIELD].as_str().unwrap();

        assert!(db.get("notes", id).is_none());
        assert!(db.list("notes", Pagination::default()).is_empty());
        assert!(!db.remove("notes", id));
        assert_eq!(db.len("todos"), 1);
    }

    #[test]
    fn replace_keeps_position_and_id() {
        let db = Collections::new();
        let first = db.insert("todos", record(json!({"title": "a"})));
        db.insert("todos", record(json!({"title": "b"})));
        let id = first[ID_FIELD].as_str().unwrap();

        let replaced = db
            .replace("todos", id, record(json!({"title": "A", "done": true})))
            .unwrap();
        assert_eq!(replaced[ID_FIELD], json!(id));

        let all = db.list("todos", Pagination::default());
        assert_eq!(all[0]["title"], json!("A"));
        assert_eq!(all[1]["title"], json!("b"));
        assert!(db.replace("todos", "missing", Record::new()).is_none());
    }

    #[test]
    fn list_pages_in_insertion_order() {
        let db = Collections::new();
        for title in ["a", "b", "c", "d"] {
            db.insert("todos", record(json!({"title": title})));
        }

        let page = db.list("todos", Pagination::new(Some(2), 1));
        let titles: Vec<_> = page.iter().map(|r| r["title"].clone()).collect();
        assert_eq!(titles, vec![json!("b"), json!("c")]);
    }

    #[test]
    fn counts_cover_every_collection() {
        let db = Collections::new();
        assert!(db.counts().is_empty());

        db.insert("todos", record(json!({})));
        db.insert("todos", record(json!({})));
        let note = db.insert("notes", record(json!({})));
        db.remove("notes", note[ID_FIELD].as_str().unwrap());

        let counts = db.counts();
        assert_eq!(counts.get("todos"), Some(&2));
        assert_eq!(counts.get("notes"), Some(&0));
    }

    #[test]
    fn remove_reports_presence() {
        let db = Collections::new();
        let created = db.insert("todos", record(json!({"title": "a"})));
        let id = created[ID_FIELD].as_str().unwrap();

        assert!(db.remove("todos", id));
        assert!(!db.remove("todos", id));
        assert_eq!(db.len("todos"), 0);
    }
}
