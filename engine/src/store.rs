//! Store - the reconciliation engine.
//!
//! A [`Store`] keeps a [`LiveCollection`] consistent with a remote
//! [`Resource`]. Inbound, [`Store::load`], [`Store::merge`] and
//! [`Store::sync_one`] fold remote data into the collection. Outbound,
//! [`Store::reconcile`] diffs every entry against its baseline and issues
//! create/update/delete calls; the host triggers it through
//! [`Store::notify_changed`], which is debounced.

use crate::{
    collection::position_of,
    debounce::Debouncer,
    error::Result,
    events::{EventBus, EventKind, ItemSnapshot, ListenerId, RemoteOp, StoreEvent},
    resource::Pagination,
    Entry, Error, FieldPolicy, IdentityRegistry, Item, LiveCollection, LocalId, Record, RemoteId,
    Resource, StoreConfig,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Counts from one inbound merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Records without a usable remote id
    pub skipped: usize,
}

/// Result of folding one remote record (or its absence) into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created(LocalId),
    Updated(LocalId),
    Unchanged(LocalId),
    Deleted(LocalId),
    /// Not found remotely and unknown locally
    Absent,
}

/// One outbound pass: what was scheduled, plus the running remote calls.
#[derive(Debug, Default)]
pub struct ReconcilePass {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    /// Locally removed items that never reached the remote
    pub dropped: usize,
    /// Items skipped because an earlier call for them is still running
    pub skipped: usize,
    tasks: Vec<JoinHandle<()>>,
}

impl ReconcilePass {
    /// Whether no remote call was scheduled.
    pub fn is_empty(&self) -> bool {
        self.creates + self.updates + self.deletes == 0
    }

    /// Waits for every remote call of this pass to complete.
    pub async fn completed(mut self) -> Self {
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "reconcile task did not finish");
            }
        }
        self
    }
}

#[derive(Debug)]
enum Planned {
    Create {
        local_id: LocalId,
        payload: Record,
    },
    Update {
        local_id: LocalId,
        remote_id: RemoteId,
        payload: Record,
    },
    Delete {
        local_id: LocalId,
        remote_id: RemoteId,
    },
}

#[derive(Debug)]
enum Completed {
    Create(Result<Record>),
    Update(Result<Record>),
    Delete(Result<()>),
}

#[derive(Debug, Default)]
struct SyncState {
    registry: IdentityRegistry,
    loaded: bool,
    closed: bool,
}

struct StoreInner {
    config: StoreConfig,
    policy: FieldPolicy,
    resource: Arc<dyn Resource>,
    collection: LiveCollection,
    state: Mutex<SyncState>,
    events: EventBus,
    debouncer: Debouncer,
    runtime: Handle,
}

impl StoreInner {
    /// Applies a successful create/update response to the item's entry.
    ///
    /// Returns the value to report and whether another outbound pass is
    /// needed because the entry moved on while the call was in flight.
    fn settle(&self, item: &mut Item, sent: &Record, response: &Record) -> (Record, bool) {
        let policy = &self.policy;
        let mut entries = self.collection.write();
        let Some(index) = position_of(&entries, item.local_id()) else {
            // Removed meanwhile; the next pass issues the delete.
            item.commit_remote(response, policy);
            return (response.clone(), true);
        };
        let value = &mut entries[index].value;
        if policy.same_visible(value, sent) {
            Item::apply_remote(value, response, policy);
            item.commit(value, policy);
            return (value.clone(), false);
        }
        // Edited meanwhile; keep the edit and push it on the next pass.
        if let Some(remote_id) = item.remote_id() {
            value.insert(policy.id_field().to_string(), remote_id.to_value());
        }
        item.commit_remote(response, policy);
        (value.clone(), true)
    }

    /// Error event for a failed call. The baseline stays as it was so the
    /// next pass retries.
    fn failure(&self, op: RemoteOp, error: Error, item: &Item) -> StoreEvent {
        tracing::warn!(
            store = %self.config.store_id,
            local_id = item.local_id(),
            ?op,
            %error,
            "remote call failed"
        );
        let value = self
            .collection
            .get(item.local_id())
            .map(|entry| entry.value)
            .unwrap_or_else(|| item.baseline().clone());
        StoreEvent::Error {
            op,
            error,
            item: Some(snapshot(item, &value)),
        }
    }
}

/// Handle to a sync store. Clones share the same engine.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Host hook for "the live collection may have changed".
///
/// Holds only a weak reference; notifying a dropped store does nothing.
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Weak<StoreInner>,
}

impl ChangeNotifier {
    /// Returns false if the store is gone.
    pub fn notify(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                Store { inner }.notify_changed();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

fn snapshot(item: &Item, value: &Record) -> ItemSnapshot {
    ItemSnapshot {
        local_id: item.local_id(),
        remote_id: item.remote_id().cloned(),
        value: value.clone(),
    }
}

/// Create-or-update path for one remote record.
fn absorb(
    policy: &FieldPolicy,
    registry: &mut IdentityRegistry,
    entries: &mut Vec<Entry>,
    remote_id: RemoteId,
    record: Record,
    events: &mut Vec<StoreEvent>,
) -> SyncOutcome {
    let Some(local_id) = registry.local_for_remote(&remote_id) else {
        let item = Item::wrap_remote(&record, policy, remote_id);
        let local_id = item.local_id();
        events.push(StoreEvent::CreateRemote {
            item: snapshot(&item, &record),
        });
        entries.push(Entry::tracked(local_id, record));
        registry.register_local(item);
        return SyncOutcome::Created(local_id);
    };

    // Removed locally; the outbound pass owns it now.
    let Some(index) = position_of(entries, local_id) else {
        return SyncOutcome::Unchanged(local_id);
    };
    let Some(item) = registry.get_mut(local_id) else {
        return SyncOutcome::Unchanged(local_id);
    };
    let value = &mut entries[index].value;
    if policy.same_visible(value, &record) {
        return SyncOutcome::Unchanged(local_id);
    }

    // Last remote write wins, even over unsent local edits.
    Item::apply_remote(value, &record, policy);
    item.commit(value, policy);
    events.push(StoreEvent::UpdateRemote {
        item: snapshot(item, value),
        record,
    });
    SyncOutcome::Updated(local_id)
}

/// Removes a remotely deleted item from the collection and the registry.
fn forget(
    registry: &mut IdentityRegistry,
    entries: &mut Vec<Entry>,
    remote_id: &RemoteId,
) -> Option<StoreEvent> {
    let local_id = registry.local_for_remote(remote_id)?;
    let item = registry.unregister(local_id)?;
    let value = match position_of(entries, local_id) {
        Some(index) => entries[index].value.clone(),
        None => item.baseline().clone(),
    };
    entries.retain(|entry| entry.local_id() != Some(local_id));
    Some(StoreEvent::DeleteRemote {
        item: snapshot(&item, &value),
    })
}

impl Store {
    /// Creates a store with a fresh, empty live collection.
    ///
    /// Must be called from within a tokio runtime; remote calls and the
    /// debounce timer run on it.
    pub fn new(config: StoreConfig, resource: Arc<dyn Resource>) -> Result<Self> {
        Self::with_collection(config, resource, LiveCollection::new())
    }

    /// Creates a store over a collection handle owned by the host.
    pub fn with_collection(
        config: StoreConfig,
        resource: Arc<dyn Resource>,
        collection: LiveCollection,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let policy = config.field_policy();

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| {
            let weak = weak.clone();
            let debouncer = Debouncer::new(
                config.debounce_window(),
                config.debounce_mode,
                runtime.clone(),
                move || {
                    if let Some(inner) = weak.upgrade() {
                        Store { inner }.reconcile();
                    }
                },
            );
            StoreInner {
                config,
                policy,
                resource,
                collection,
                state: Mutex::new(SyncState::default()),
                events: EventBus::new(),
                debouncer,
                runtime,
            }
        });

        tracing::debug!(store = %inner.config.store_id, url = %inner.config.url, "store created");
        Ok(Self { inner })
    }

    /// Creates a store talking REST to `config.url`.
    #[cfg(feature = "http")]
    pub fn connect(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let resource = Arc::new(crate::http::HttpResource::from_config(&config));
        Self::new(config, resource)
    }

    pub fn store_id(&self) -> &str {
        &self.inner.config.store_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn field_policy(&self) -> &FieldPolicy {
        &self.inner.policy
    }

    /// Handle to the live collection.
    pub fn collection(&self) -> LiveCollection {
        self.inner.collection.clone()
    }

    pub fn resource(&self) -> Arc<dyn Resource> {
        Arc::clone(&self.inner.resource)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Registers an event handler.
    ///
    /// Handlers run outside engine locks and may call back into the store.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler)
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.events.off(kind, id)
    }

    pub fn emit(&self, event: &StoreEvent) {
        self.inner.events.emit(event)
    }

    /// Sets event suppression, or toggles it when `flag` is `None`.
    pub fn suppress_events(&self, flag: Option<bool>) -> bool {
        self.inner.events.suppress(flag)
    }

    fn dispatch(&self, events: Vec<StoreEvent>) {
        for event in &events {
            self.inner.events.emit(event);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current state of a tracked item.
    pub fn item(&self, local_id: LocalId) -> Option<ItemSnapshot> {
        let state = self.inner.state.lock();
        let item = state.registry.get(local_id)?;
        let value = self
            .inner
            .collection
            .get(local_id)
            .map(|entry| entry.value)
            .unwrap_or_else(|| item.baseline().clone());
        Some(snapshot(item, &value))
    }

    pub fn local_id_for(&self, remote_id: &RemoteId) -> Option<LocalId> {
        self.inner.state.lock().registry.local_for_remote(remote_id)
    }

    /// Whether a tracked entry in the collection differs from its baseline.
    pub fn has_changed(&self, local_id: LocalId) -> Option<bool> {
        let state = self.inner.state.lock();
        let item = state.registry.get(local_id)?;
        let entry = self.inner.collection.get(local_id)?;
        Some(item.has_changed(&entry.value, &self.inner.policy))
    }

    /// Number of items the registry knows.
    pub fn tracked_count(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Number of items with a known remote identity.
    pub fn remote_count(&self) -> usize {
        self.inner.state.lock().registry.remote_len()
    }

    /// Number of items with a remote call in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .registry
            .items()
            .filter(|item| item.is_in_flight())
            .count()
    }

    /// Whether the first bulk merge has happened.
    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().loaded
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Fetches the whole remote collection and merges it.
    pub async fn load(&self) -> Result<MergeSummary> {
        tracing::debug!(store = %self.store_id(), threshold = ?self.inner.config.threshold, "loading remote collection");

        match self.fetch_snapshot().await {
            Ok(data) => Ok(self.merge(data)),
            Err(error) => {
                tracing::warn!(store = %self.store_id(), %error, "load failed");
                self.emit(&StoreEvent::Error {
                    op: RemoteOp::FetchAll,
                    error: error.clone(),
                    item: None,
                });
                Err(error)
            }
        }
    }

    /// Reads every remote record. With a threshold set, pages of that size
    /// are requested until an empty page comes back; a page larger than
    /// asked for means the remote ignores paging and is taken as complete.
    async fn fetch_snapshot(&self) -> Result<Vec<Record>> {
        let resource = &self.inner.resource;
        let Some(limit) = self.inner.config.threshold.filter(|limit| *limit > 0) else {
            return resource.fetch_all(Pagination::default()).await;
        };

        let mut data = Vec::new();
        loop {
            let page = Pagination::new(Some(limit), data.len() as u64);
            let records = resource.fetch_all(page).await?;
            let ignored_paging = records.len() as u64 > limit;
            if records.is_empty() {
                return Ok(data);
            }
            if ignored_paging {
                return Ok(records);
            }
            data.extend(records);
        }
    }

    /// Folds a remote snapshot into the live collection.
    ///
    /// Known records that differ are overwritten, unknown ones are appended,
    /// and known records missing from `data` are removed. Events from the
    /// first merge of a store are discarded.
    pub fn merge(&self, data: Vec<Record>) -> MergeSummary {
        let inner = &self.inner;
        let mut summary = MergeSummary::default();
        let mut events = Vec::new();

        let first = {
            let mut state = inner.state.lock();
            if state.closed {
                return summary;
            }
            let first = !std::mem::replace(&mut state.loaded, true);
            let registry = &mut state.registry;
            let mut entries = inner.collection.write();

            let mut pending_removal: HashSet<RemoteId> = registry.remote_ids().cloned().collect();
            for record in data {
                let Some(remote_id) = inner.policy.remote_id(&record) else {
                    tracing::warn!(
                        store = %inner.config.store_id,
                        id_field = %inner.policy.id_field(),
                        "skipping remote record without id"
                    );
                    summary.skipped += 1;
                    continue;
                };
                pending_removal.remove(&remote_id);
                match absorb(
                    &inner.policy,
                    registry,
                    &mut entries,
                    remote_id,
                    record,
                    &mut events,
                ) {
                    SyncOutcome::Created(_) => summary.created += 1,
                    SyncOutcome::Updated(_) => summary.updated += 1,
                    _ => {}
                }
            }

            for remote_id in pending_removal {
                if let Some(event) = forget(registry, &mut entries, &remote_id) {
                    summary.deleted += 1;
                    events.push(event);
                }
            }
            first
        };

        tracing::debug!(
            store = %inner.config.store_id,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            initial = first,
            "merged remote snapshot"
        );
        if !first {
            self.dispatch(events);
        }
        summary
    }

    /// Refreshes one record from the remote.
    ///
    /// A not-found answer for a known id counts as a remote deletion.
    pub async fn sync_one(&self, remote_id: &RemoteId) -> Result<SyncOutcome> {
        let fetched = match self.inner.resource.fetch_one(remote_id).await {
            Ok(fetched) => fetched,
            Err(error) => {
                tracing::warn!(store = %self.store_id(), %remote_id, %error, "fetch one failed");
                let item = self
                    .local_id_for(remote_id)
                    .and_then(|local_id| self.item(local_id));
                self.emit(&StoreEvent::Error {
                    op: RemoteOp::FetchOne,
                    error: error.clone(),
                    item,
                });
                return Err(error);
            }
        };

        let inner = &self.inner;
        let mut events = Vec::new();
        let outcome = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Error::Closed);
            }
            let mut entries = inner.collection.write();
            match fetched {
                Some(mut record) => {
                    let id = match inner.policy.remote_id(&record) {
                        Some(id) => id,
                        None => {
                            record.insert(inner.policy.id_field().to_string(), remote_id.to_value());
                            remote_id.clone()
                        }
                    };
                    absorb(
                        &inner.policy,
                        &mut state.registry,
                        &mut entries,
                        id,
                        record,
                        &mut events,
                    )
                }
                None => match forget(&mut state.registry, &mut entries, remote_id) {
                    Some(event) => {
                        let local_id = event.item().map_or(0, |item| item.local_id);
                        events.push(event);
                        SyncOutcome::Deleted(local_id)
                    }
                    None => SyncOutcome::Absent,
                },
            }
        };

        tracing::debug!(store = %self.store_id(), %remote_id, ?outcome, "synced one record");
        self.dispatch(events);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    /// Host hook: the live collection may have changed. Debounced.
    pub fn notify_changed(&self) {
        if self.is_closed() {
            return;
        }
        self.inner.debouncer.notify();
    }

    /// A detached notification handle for the host.
    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether a debounced reconciliation is pending.
    pub fn is_reconcile_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Diffs the live collection against baselines and issues remote calls.
    ///
    /// The create/update/delete sets are computed under one lock before any
    /// call starts. Items with a call still in flight are skipped.
    pub fn reconcile(&self) -> ReconcilePass {
        let inner = &self.inner;
        let policy = &inner.policy;
        let mut pass = ReconcilePass::default();
        let mut deletes = Vec::new();
        let mut creates = Vec::new();
        let mut updates = Vec::new();

        {
            let mut state = inner.state.lock();
            if state.closed {
                return pass;
            }
            let registry = &mut state.registry;
            let mut entries = inner.collection.write();
            let mut to_delete: BTreeSet<LocalId> = registry.local_ids().collect();

            for entry in entries.iter_mut() {
                let local_id = match entry.local_id() {
                    Some(local_id) if registry.contains_local(local_id) => local_id,
                    _ => {
                        let mut item = Item::wrap(&entry.value, policy);
                        item.begin_op();
                        entry.set_local_id(item.local_id());
                        creates.push(Planned::Create {
                            local_id: item.local_id(),
                            payload: policy.visible(&entry.value),
                        });
                        registry.register_local(item);
                        continue;
                    }
                };
                to_delete.remove(&local_id);

                let Some(item) = registry.get_mut(local_id) else {
                    continue;
                };
                if item.is_in_flight() {
                    pass.skipped += 1;
                    continue;
                }
                match item.remote_id().cloned() {
                    // A create that never went through
                    None => {
                        item.begin_op();
                        creates.push(Planned::Create {
                            local_id,
                            payload: policy.visible(&entry.value),
                        });
                    }
                    Some(remote_id) if item.has_changed(&entry.value, policy) => {
                        item.begin_op();
                        updates.push(Planned::Update {
                            local_id,
                            remote_id,
                            payload: policy.visible(&entry.value),
                        });
                    }
                    Some(_) => {}
                }
            }

            for local_id in to_delete {
                let Some(item) = registry.get_mut(local_id) else {
                    continue;
                };
                if item.is_in_flight() {
                    pass.skipped += 1;
                    continue;
                }
                match item.remote_id().cloned() {
                    Some(remote_id) => {
                        item.begin_op();
                        deletes.push(Planned::Delete {
                            local_id,
                            remote_id,
                        });
                    }
                    None => {
                        registry.unregister(local_id);
                        pass.dropped += 1;
                    }
                }
            }
        }

        pass.deletes = deletes.len();
        pass.creates = creates.len();
        pass.updates = updates.len();
        if !pass.is_empty() || pass.skipped > 0 {
            tracing::debug!(
                store = %inner.config.store_id,
                creates = pass.creates,
                updates = pass.updates,
                deletes = pass.deletes,
                dropped = pass.dropped,
                skipped = pass.skipped,
                "reconciling local changes"
            );
        }

        for plan in deletes.into_iter().chain(creates).chain(updates) {
            pass.tasks.push(self.spawn_remote(plan));
        }
        pass
    }

    /// Runs [`Store::reconcile`] and waits for its remote calls.
    pub async fn flush(&self) -> ReconcilePass {
        self.reconcile().completed().await
    }

    fn spawn_remote(&self, plan: Planned) -> JoinHandle<()> {
        let resource = Arc::clone(&self.inner.resource);
        let weak = Arc::downgrade(&self.inner);
        self.inner.runtime.spawn(async move {
            let (local_id, sent, completed) = match plan {
                Planned::Create { local_id, payload } => {
                    let result = resource.create(payload.clone()).await;
                    (local_id, payload, Completed::Create(result))
                }
                Planned::Update {
                    local_id,
                    remote_id,
                    payload,
                } => {
                    let result = resource.update(&remote_id, payload.clone()).await;
                    (local_id, payload, Completed::Update(result))
                }
                Planned::Delete {
                    local_id,
                    remote_id,
                } => {
                    let result = resource.delete(&remote_id).await;
                    (local_id, Record::new(), Completed::Delete(result))
                }
            };
            // A dropped store ignores late completions.
            if let Some(inner) = weak.upgrade() {
                Store { inner }.complete(local_id, sent, completed);
            }
        })
    }

    fn complete(&self, local_id: LocalId, sent: Record, completed: Completed) {
        let inner = &self.inner;
        let outcome = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            let registry = &mut state.registry;
            let Some(item) = registry.get_mut(local_id) else {
                return;
            };
            item.end_op();

            match completed {
                Completed::Delete(Ok(())) => registry.unregister(local_id).map(|item| {
                    tracing::debug!(store = %inner.config.store_id, local_id, "deleted remotely");
                    let event = StoreEvent::Delete {
                        item: snapshot(&item, item.baseline()),
                    };
                    (event, false)
                }),
                Completed::Create(Ok(response)) => match inner.policy.remote_id(&response) {
                    None => {
                        let error = Error::InvalidResponse(format!(
                            "created record has no '{}'",
                            inner.policy.id_field()
                        ));
                        Some((inner.failure(RemoteOp::Create, error, item), false))
                    }
                    Some(remote_id) => {
                        // An inbound merge may have adopted the new record
                        // while the create was in flight. The entry the host
                        // added stays; the merged copy goes.
                        let duplicate = registry
                            .local_for_remote(&remote_id)
                            .filter(|other| *other != local_id);
                        if let Some(duplicate) = duplicate {
                            registry.unregister(duplicate);
                            inner
                                .collection
                                .retain(|entry| entry.local_id() != Some(duplicate));
                            tracing::debug!(
                                store = %inner.config.store_id,
                                local_id,
                                duplicate,
                                %remote_id,
                                "dropped merged copy of created record"
                            );
                        }
                        if !registry.register_remote(remote_id.clone(), local_id) {
                            let error = Error::InvalidResponse(format!(
                                "remote id {remote_id} cannot be bound to item {local_id}"
                            ));
                            registry
                                .get(local_id)
                                .map(|item| (inner.failure(RemoteOp::Create, error, item), false))
                        } else {
                            tracing::debug!(store = %inner.config.store_id, local_id, %remote_id, "created remotely");
                            let Some(item) = registry.get_mut(local_id) else {
                                return;
                            };
                            let (value, follow_up) = inner.settle(item, &sent, &response);
                            let event = StoreEvent::Create {
                                item: snapshot(item, &value),
                                response,
                            };
                            Some((event, follow_up))
                        }
                    }
                },
                Completed::Update(Ok(response)) => {
                    tracing::debug!(store = %inner.config.store_id, local_id, "updated remotely");
                    let (value, follow_up) = inner.settle(item, &sent, &response);
                    let event = StoreEvent::Update {
                        item: snapshot(item, &value),
                        response,
                    };
                    Some((event, follow_up))
                }
                Completed::Create(Err(error)) => {
                    Some((inner.failure(RemoteOp::Create, error, item), false))
                }
                Completed::Update(Err(error)) => {
                    Some((inner.failure(RemoteOp::Update, error, item), false))
                }
                Completed::Delete(Err(error)) => {
                    Some((inner.failure(RemoteOp::Delete, error, item), false))
                }
            }
        };

        let Some((event, follow_up)) = outcome else {
            return;
        };
        self.emit(&event);
        if follow_up {
            self.notify_changed();
        }
    }

    // ------------------------------------------------------------------
    // Extra methods and teardown
    // ------------------------------------------------------------------

    /// Invokes an extra resource method declared in the config.
    pub async fn call(&self, method: &str, params: Record) -> Result<Value> {
        if !self.inner.config.methods.contains_key(method) {
            return Err(Error::UnknownMethod(method.to_string()));
        }
        self.inner.resource.call(method, params).await
    }

    /// Stops the store. Pending debounced runs are dropped and completions
    /// of remote calls still in flight are ignored. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.inner.debouncer.cancel();
        tracing::debug!(store = %self.store_id(), "store shut down");
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("store_id", &self.inner.config.store_id)
            .field("entries", &self.inner.collection.len())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryResource;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn policy() -> FieldPolicy {
        FieldPolicy::new("id", ["selected".to_string()].into())
    }

    fn store() -> Store {
        let config = StoreConfig::new("users", "memory://users", "id").with_hidden_field("selected");
        Store::new(config, Arc::new(MemoryResource::new("id"))).unwrap()
    }

    #[test]
    fn absorb_creates_then_settles() {
        let policy = policy();
        let mut registry = IdentityRegistry::new();
        let mut entries = Vec::new();
        let mut events = Vec::new();
        let remote = record(json!({"id": 1, "name": "ann"}));

        let created = absorb(
            &policy,
            &mut registry,
            &mut entries,
            RemoteId::Int(1),
            remote.clone(),
            &mut events,
        );
        let SyncOutcome::Created(local_id) = created else {
            panic!("expected a create, got {created:?}");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].local_id(), Some(local_id));

        let again = absorb(
            &policy,
            &mut registry,
            &mut entries,
            RemoteId::Int(1),
            remote,
            &mut events,
        );
        assert_eq!(again, SyncOutcome::Unchanged(local_id));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn absorb_leaves_locally_removed_items_alone() {
        let policy = policy();
        let mut registry = IdentityRegistry::new();
        let mut entries = Vec::new();
        let mut events = Vec::new();

        absorb(
            &policy,
            &mut registry,
            &mut entries,
            RemoteId::Int(1),
            record(json!({"id": 1, "name": "ann"})),
            &mut events,
        );
        entries.clear();
        let outcome = absorb(
            &policy,
            &mut registry,
            &mut entries,
            RemoteId::Int(1),
            record(json!({"id": 1, "name": "anne"})),
            &mut events,
        );

        assert!(matches!(outcome, SyncOutcome::Unchanged(_)));
        assert!(entries.is_empty());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn forget_ignores_unknown_ids() {
        let mut registry = IdentityRegistry::new();
        let mut entries = vec![Entry::new(record(json!({"id": 5})))];
        assert!(forget(&mut registry, &mut entries, &RemoteId::Int(5)).is_none());
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn merge_after_shutdown_does_nothing() {
        let store = store();
        store.shutdown();
        let summary = store.merge(vec![record(json!({"id": 1}))]);
        assert_eq!(summary, MergeSummary::default());
        assert!(store.collection().is_empty());
        assert_eq!(
            store.sync_one(&RemoteId::Int(1)).await.unwrap_err(),
            Error::Closed
        );
    }

    #[tokio::test]
    async fn create_without_id_in_response_is_an_error() {
        struct Forgetful;

        #[async_trait::async_trait]
        impl Resource for Forgetful {
            async fn fetch_all(&self, _page: Pagination) -> Result<Vec<Record>> {
                Ok(Vec::new())
            }
            async fn fetch_one(&self, _id: &RemoteId) -> Result<Option<Record>> {
                Ok(None)
            }
            async fn create(&self, record: Record) -> Result<Record> {
                Ok(record)
            }
            async fn update(&self, _id: &RemoteId, record: Record) -> Result<Record> {
                Ok(record)
            }
            async fn delete(&self, _id: &RemoteId) -> Result<()> {
                Ok(())
            }
        }

        let config = StoreConfig::new("users", "memory://users", "id");
        let store = Store::new(config, Arc::new(Forgetful)).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        {
            let errors = Arc::clone(&errors);
            store.on(EventKind::Error, move |event| {
                if let StoreEvent::Error { error, .. } = event {
                    errors.lock().push(error.clone());
                }
            });
        }

        store.collection().push(record(json!({"name": "ann"})));
        store.flush().await;

        assert!(matches!(&errors.lock()[..], [Error::InvalidResponse(_)]));
        assert_eq!(store.remote_count(), 0);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn snapshot_records(rows: &BTreeMap<i64, String>) -> Vec<Record> {
            rows.iter()
                .map(|(id, name)| record(json!({"id": id, "name": name})))
                .collect()
        }

        fn arb_snapshot() -> impl Strategy<Value = BTreeMap<i64, String>> {
            prop::collection::btree_map(0i64..40, "[a-z]{1,6}", 0..20)
        }

        proptest! {
            #[test]
            fn prop_merge_converges_and_is_idempotent(
                first in arb_snapshot(),
                second in arb_snapshot(),
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let _guard = runtime.enter();
                let store = store();

                store.merge(snapshot_records(&first));
                store.merge(snapshot_records(&second));
                let again = store.merge(snapshot_records(&second));

                prop_assert_eq!(again, MergeSummary::default());
                prop_assert_eq!(store.tracked_count(), second.len());

                let mut merged: Vec<Record> = store.collection().values();
                merged.sort_by_key(|r| r["id"].as_i64());
                prop_assert_eq!(merged, snapshot_records(&second));

                for entry in store.collection().snapshot() {
                    let local_id = entry.local_id().unwrap();
                    prop_assert_eq!(store.has_changed(local_id), Some(false));
                }
            }

            #[test]
            fn prop_local_ids_survive_remote_edits(
                rows in arb_snapshot(),
                suffix in "[a-z]{1,3}",
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let _guard = runtime.enter();
                let store = store();

                store.merge(snapshot_records(&rows));
                let before: Vec<Option<LocalId>> = rows
                    .keys()
                    .map(|id| store.local_id_for(&RemoteId::Int(*id)))
                    .collect();

                let edited: BTreeMap<i64, String> = rows
                    .iter()
                    .map(|(id, name)| (*id, format!("{name}{suffix}")))
                    .collect();
                let summary = store.merge(snapshot_records(&edited));
                let after: Vec<Option<LocalId>> = rows
                    .keys()
                    .map(|id| store.local_id_for(&RemoteId::Int(*id)))
                    .collect();

                prop_assert_eq!(summary.updated, rows.len());
                prop_assert_eq!(before, after);
            }
        }
    }
}
