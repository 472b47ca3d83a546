//! The live collection shared between the host and the engine.
//!
//! The host owns a [`LiveCollection`] handle and edits it freely: push new
//! records, change fields, remove entries. The engine reads it during
//! reconciliation and writes it when absorbing remote data. Membership is the
//! source of truth for what should exist remotely.

use crate::{LocalId, Record};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use std::sync::Arc;

/// One slot of the live collection.
///
/// `value` is the record the host sees and edits. The local id is assigned by
/// the engine once it discovers the entry and is read-only for the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    local_id: Option<LocalId>,
    /// The record fields
    pub value: Record,
}

impl Entry {
    /// An entry the engine has not discovered yet.
    pub fn new(value: Record) -> Self {
        Self {
            local_id: None,
            value,
        }
    }

    pub(crate) fn tracked(local_id: LocalId, value: Record) -> Self {
        Self {
            local_id: Some(local_id),
            value,
        }
    }

    pub(crate) fn set_local_id(&mut self, local_id: LocalId) {
        self.local_id = Some(local_id);
    }

    pub fn local_id(&self) -> Option<LocalId> {
        self.local_id
    }

    pub fn is_tracked(&self) -> bool {
        self.local_id.is_some()
    }

    /// Shortcut for `value.get(field)`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }
}

impl From<Record> for Entry {
    fn from(value: Record) -> Self {
        Entry::new(value)
    }
}

/// Cloneable handle to an ordered sequence of entries.
#[derive(Debug, Clone, Default)]
pub struct LiveCollection {
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl LiveCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from untracked records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let entries = records.into_iter().map(Entry::new).collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Shared access to all entries.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read()
    }

    /// Exclusive access to all entries.
    ///
    /// Do not hold the guard across calls into the store.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write()
    }

    /// Appends a new, untracked record.
    pub fn push(&self, record: Record) {
        self.entries.write().push(Entry::new(record));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clones all entries.
    pub fn snapshot(&self) -> Vec<Entry> {
        self.entries.read().clone()
    }

    /// Clones all record values.
    pub fn values(&self) -> Vec<Record> {
        self.entries.read().iter().map(|e| e.value.clone()).collect()
    }

    /// Position of the entry with `local_id`.
    pub fn position(&self, local_id: LocalId) -> Option<usize> {
        position_of(&self.entries.read(), local_id)
    }

    /// Clone of the entry with `local_id`.
    pub fn get(&self, local_id: LocalId) -> Option<Entry> {
        let entries = self.entries.read();
        position_of(&entries, local_id).map(|i| entries[i].clone())
    }

    /// First entry whose `field` equals `value`.
    pub fn find(&self, field: &str, value: &Value) -> Option<Entry> {
        self.entries
            .read()
            .iter()
            .find(|e| e.value.get(field) == Some(value))
            .cloned()
    }

    /// Edits the record of the entry with `local_id`. Returns false if no
    /// such entry exists.
    pub fn update<F>(&self, local_id: LocalId, f: F) -> bool
    where
        F: FnOnce(&mut Record),
    {
        let mut entries = self.entries.write();
        match position_of(&entries, local_id) {
            Some(i) => {
                f(&mut entries[i].value);
                true
            }
            None => false,
        }
    }

    /// Removes the entry with `local_id`.
    pub fn remove(&self, local_id: LocalId) -> Option<Entry> {
        let mut entries = self.entries.write();
        position_of(&entries, local_id).map(|i| entries.remove(i))
    }

    /// Keeps only entries matching `keep`.
    pub fn retain<F>(&self, keep: F)
    where
        F: FnMut(&Entry) -> bool,
    {
        self.entries.write().retain(keep);
    }
}

pub(crate) fn position_of(entries: &[Entry], local_id: LocalId) -> Option<usize> {
    entries.iter().position(|e| e.local_id == Some(local_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn pushed_records_are_untracked() {
        let collection = LiveCollection::new();
        collection.push(record(json!({"title": "milk"})));

        assert_eq!(collection.len(), 1);
        assert!(!collection.read()[0].is_tracked());
    }

    #[test]
    fn handles_share_state() {
        let host = LiveCollection::from_records([record(json!({"n": 1}))]);
        let engine = host.clone();

        engine.write()[0].set_local_id(7);
        host.update(7, |r| {
            r.insert("n".into(), json!(2));
        });

        assert_eq!(engine.get(7).unwrap().get("n"), Some(&json!(2)));
        assert_eq!(engine.position(7), Some(0));
    }

    #[test]
    fn remove_and_find() {
        let collection = LiveCollection::new();
        collection
            .write()
            .push(Entry::tracked(1, record(json!({"id": "a"}))));
        collection
            .write()
            .push(Entry::tracked(2, record(json!({"id": "b"}))));

        assert_eq!(collection.find("id", &json!("b")).unwrap().local_id(), Some(2));
        assert!(collection.remove(1).is_some());
        assert!(collection.remove(1).is_none());
        assert!(!collection.update(1, |_| {}));
        assert_eq!(collection.values(), vec![record(json!({"id": "b"}))]);
    }
}
