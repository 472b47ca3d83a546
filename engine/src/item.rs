//! Baseline-tracking items.
//!
//! An [`Item`] is the engine's private view of one record: a snapshot of the
//! fields last known to match the remote, plus identity. The record itself
//! lives in the [`LiveCollection`](crate::LiveCollection) where the host can
//! edit it freely.

use crate::{LocalId, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_local_id() -> LocalId {
    NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Server-assigned identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Text(String),
}

impl RemoteId {
    /// Normalises a JSON id value. Only strings and numbers identify a record.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(RemoteId::Text(s.clone())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => RemoteId::Int(i),
                None => RemoteId::Text(n.to_string()),
            }),
            _ => None,
        }
    }

    /// JSON form used when writing the id back into a record.
    pub fn to_value(&self) -> Value {
        match self {
            RemoteId::Int(i) => Value::from(*i),
            RemoteId::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(i) => write!(f, "{i}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RemoteId {
    fn from(id: i64) -> Self {
        RemoteId::Int(id)
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        RemoteId::Text(id.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(id: String) -> Self {
        RemoteId::Text(id)
    }
}

/// Per-store rules for reading records: where the id lives and which
/// fields are local-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    id_field: String,
    hidden: BTreeSet<String>,
}

impl FieldPolicy {
    pub fn new(id_field: impl Into<String>, hidden: BTreeSet<String>) -> Self {
        Self {
            id_field: id_field.into(),
            hidden,
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.contains(field)
    }

    /// The remote identity carried by `record`, if any.
    pub fn remote_id(&self, record: &Record) -> Option<RemoteId> {
        record.get(&self.id_field).and_then(RemoteId::from_value)
    }

    /// Copy of `record` without hidden fields. This is both the comparison
    /// view and the outbound payload.
    pub fn visible(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(key, _)| !self.hidden.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Structural equality restricted to visible fields.
    pub fn same_visible(&self, a: &Record, b: &Record) -> bool {
        let visible_len = |r: &Record| r.keys().filter(|k| !self.is_hidden(k)).count();
        visible_len(a) == visible_len(b)
            && a
                .iter()
                .filter(|(key, _)| !self.is_hidden(key))
                .all(|(key, value)| b.get(key) == Some(value))
    }
}

/// Engine-side state of one wrapped record.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    local_id: LocalId,
    baseline: Record,
    remote_id: Option<RemoteId>,
    in_flight: bool,
}

impl Item {
    /// Wraps a record first seen locally. Its remote identity stays unknown
    /// until a create round trip completes.
    pub fn wrap(value: &Record, policy: &FieldPolicy) -> Self {
        Self {
            local_id: next_local_id(),
            baseline: policy.visible(value),
            remote_id: None,
            in_flight: false,
        }
    }

    /// Wraps a record received from the remote.
    pub fn wrap_remote(value: &Record, policy: &FieldPolicy, remote_id: RemoteId) -> Self {
        Self {
            remote_id: Some(remote_id),
            ..Self::wrap(value, policy)
        }
    }

    pub fn local_id(&self) -> LocalId {
        self.local_id
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    /// Last snapshot known to match the remote.
    pub fn baseline(&self) -> &Record {
        &self.baseline
    }

    /// Whether `value` drifted from the baseline (hidden fields ignored).
    pub fn has_changed(&self, value: &Record, policy: &FieldPolicy) -> bool {
        !policy.same_visible(value, &self.baseline)
    }

    /// Overwrites `value` with the fields of an authoritative `remote` record.
    ///
    /// Hidden fields are local state: they survive unless `remote` carries
    /// them too. The baseline is not touched; call [`Item::commit`] after.
    pub fn apply_remote(value: &mut Record, remote: &Record, policy: &FieldPolicy) {
        value.retain(|key, _| policy.is_hidden(key) && !remote.contains_key(key));
        value.extend(remote.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Marks `value` as agreed with the remote.
    pub fn commit(&mut self, value: &Record, policy: &FieldPolicy) {
        self.baseline = policy.visible(value);
    }

    /// Advances the baseline to a remote record without touching the value.
    pub(crate) fn commit_remote(&mut self, remote: &Record, policy: &FieldPolicy) {
        self.baseline = policy.visible(remote);
    }

    /// Records the remote identity. Once set it never changes.
    pub(crate) fn assign_remote_id(&mut self, remote_id: RemoteId) -> bool {
        if self.remote_id.is_some() {
            return false;
        }
        self.remote_id = Some(remote_id);
        true
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn begin_op(&mut self) {
        self.in_flight = true;
    }

    pub(crate) fn end_op(&mut self) {
        self.in_flight = false;
    }
}
