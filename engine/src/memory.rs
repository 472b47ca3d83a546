//! In-process resource collaborator.
//!
//! [`MemoryResource`] keeps the "remote" collection in memory. It is meant for
//! tests, demos and benchmarks: calls are logged, failures can be injected,
//! and all calls can be held open to observe in-flight behaviour.

use crate::{
    error::Result, events::RemoteOp, resource::Pagination, Error, Record, RemoteId, Resource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::watch;

/// A call received by a [`MemoryResource`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceCall {
    FetchAll(Pagination),
    FetchOne(RemoteId),
    Create(Record),
    Update(RemoteId, Record),
    Delete(RemoteId),
}

impl ResourceCall {
    pub fn op(&self) -> RemoteOp {
        match self {
            ResourceCall::FetchAll(_) => RemoteOp::FetchAll,
            ResourceCall::FetchOne(_) => RemoteOp::FetchOne,
            ResourceCall::Create(_) => RemoteOp::Create,
            ResourceCall::Update(..) => RemoteOp::Update,
            ResourceCall::Delete(_) => RemoteOp::Delete,
        }
    }
}

/// Remote collection held in memory, with integer ids.
#[derive(Debug)]
pub struct MemoryResource {
    id_field: String,
    revision_field: Option<String>,
    records: Mutex<Vec<Record>>,
    next_id: AtomicI64,
    calls: Mutex<Vec<ResourceCall>>,
    failures: Mutex<VecDeque<(RemoteOp, Error)>>,
    offline: AtomicBool,
    gate: watch::Sender<bool>,
}

impl MemoryResource {
    pub fn new(id_field: impl Into<String>) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            id_field: id_field.into(),
            revision_field: None,
            records: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            offline: AtomicBool::new(false),
            gate,
        }
    }

    /// Bumps `field` on every create and update, like a server-side
    /// revision counter.
    pub fn with_revision_field(mut self, field: impl Into<String>) -> Self {
        self.revision_field = Some(field.into());
        self
    }

    /// Seeds remote records.
    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        for record in records {
            self.insert(record);
        }
        self
    }

    /// Adds a record out-of-band, assigning an id if it has none.
    pub fn insert(&self, mut record: Record) -> RemoteId {
        let id = match record.get(&self.id_field).and_then(RemoteId::from_value) {
            Some(id) => {
                if let RemoteId::Int(n) = id {
                    self.next_id.fetch_max(n + 1, Ordering::SeqCst);
                }
                id
            }
            None => {
                let id = RemoteId::Int(self.next_id.fetch_add(1, Ordering::SeqCst));
                record.insert(self.id_field.clone(), id.to_value());
                id
            }
        };
        self.records.lock().push(record);
        id
    }

    /// Edits a record out-of-band.
    pub fn modify<F>(&self, id: &RemoteId, f: F) -> bool
    where
        F: FnOnce(&mut Record),
    {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| self.id_of(r).as_ref() == Some(id)) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    /// Removes a record out-of-band.
    pub fn remove(&self, id: &RemoteId) -> Option<Record> {
        let mut records = self.records.lock();
        let index = records
            .iter()
            .position(|r| self.id_of(r).as_ref() == Some(id))?;
        Some(records.remove(index))
    }

    pub fn get(&self, id: &RemoteId) -> Option<Record> {
        self.records
            .lock()
            .iter()
            .find(|r| self.id_of(r).as_ref() == Some(id))
            .cloned()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<ResourceCall> {
        self.calls.lock().clone()
    }

    /// Number of received calls of kind `op`.
    pub fn count(&self, op: RemoteOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op() == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Makes the next call of kind `op` fail with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: Error) {
        self.failures.lock().push_back((op, error));
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Holds every subsequent call open until [`MemoryResource::release`].
    pub fn hold(&self) {
        self.gate.send_replace(true);
    }

    pub fn release(&self) {
        self.gate.send_replace(false);
    }

    fn id_of(&self, record: &Record) -> Option<RemoteId> {
        record.get(&self.id_field).and_then(RemoteId::from_value)
    }

    fn bump_revision(&self, record: &mut Record) {
        if let Some(field) = &self.revision_field {
            let next = record.get(field).and_then(Value::as_i64).unwrap_or(0) + 1;
            record.insert(field.clone(), Value::from(next));
        }
    }

    async fn enter(&self, call: ResourceCall) -> Result<()> {
        let op = call.op();
        self.calls.lock().push(call);

        let mut gate = self.gate.subscribe();
        // The sender lives in self, so this only returns once released.
        let _ = gate.wait_for(|held| !*held).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("resource offline".into()));
        }
        let mut failures = self.failures.lock();
        if let Some(index) = failures.iter().position(|(failing, _)| *failing == op) {
            if let Some((_, error)) = failures.remove(index) {
                return Err(error);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Resource for MemoryResource {
    async fn fetch_all(&self, page: Pagination) -> Result<Vec<Record>> {
        self.enter(ResourceCall::FetchAll(page)).await?;
        Ok(page.slice(&self.records.lock()))
    }

    async fn fetch_one(&self, id: &RemoteId) -> Result<Option<Record>> {
        self.enter(ResourceCall::FetchOne(id.clone())).await?;
        Ok(self.get(id))
    }

    async fn create(&self, mut record: Record) -> Result<Record> {
        self.enter(ResourceCall::Create(record.clone())).await?;
        let id = RemoteId::Int(self.next_id.fetch_add(1, Ordering::SeqCst));
        record.insert(self.id_field.clone(), id.to_value());
        self.bump_revision(&mut record);
        self.records.lock().push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &RemoteId, mut record: Record) -> Result<Record> {
        self.enter(ResourceCall::Update(id.clone(), record.clone()))
            .await?;
        let mut records = self.records.lock();
        let stored = records
            .iter_mut()
            .find(|r| self.id_of(r).as_ref() == Some(id))
            .ok_or_else(|| Error::Status {
                status: 404,
                message: format!("no record {id}"),
            })?;
        record.insert(self.id_field.clone(), id.to_value());
        if let Some(field) = &self.revision_field {
            if let Some(current) = stored.get(field) {
                record.insert(field.clone(), current.clone());
            }
        }
        self.bump_revision(&mut record);
        *stored = record.clone();
        Ok(record)
    }

    async fn delete(&self, id: &RemoteId) -> Result<()> {
        self.enter(ResourceCall::Delete(id.clone())).await?;
        self.remove(id);
        Ok(())
    }
}
