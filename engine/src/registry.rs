//! Identity registry: maps local ids to items and remote ids to local ids.

use crate::{Item, LocalId, RemoteId};
use std::collections::{BTreeMap, HashMap};

/// Owns every item a store has wrapped, indexed both ways.
///
/// Entries live exactly as long as their item; nothing is evicted
/// implicitly.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_local: BTreeMap<LocalId, Item>,
    by_remote: HashMap<RemoteId, LocalId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item. If it already knows its remote identity, that is
    /// indexed too.
    pub fn register_local(&mut self, item: Item) {
        if let Some(remote_id) = item.remote_id() {
            self.by_remote.insert(remote_id.clone(), item.local_id());
        }
        self.by_local.insert(item.local_id(), item);
    }

    /// Indexes `local_id` under `remote_id`.
    ///
    /// Returns false if the item is unknown, already bound to a different
    /// remote id, or `remote_id` already belongs to another item.
    pub fn register_remote(&mut self, remote_id: RemoteId, local_id: LocalId) -> bool {
        if matches!(self.by_remote.get(&remote_id), Some(bound) if *bound != local_id) {
            return false;
        }
        let Some(item) = self.by_local.get_mut(&local_id) else {
            return false;
        };
        match item.remote_id() {
            Some(existing) if *existing != remote_id => return false,
            Some(_) => {}
            None => {
                item.assign_remote_id(remote_id.clone());
            }
        }
        self.by_remote.insert(remote_id, local_id);
        true
    }

    /// Removes an item from both maps.
    pub fn unregister(&mut self, local_id: LocalId) -> Option<Item> {
        let item = self.by_local.remove(&local_id)?;
        if let Some(remote_id) = item.remote_id() {
            if self.by_remote.get(remote_id) == Some(&local_id) {
                self.by_remote.remove(remote_id);
            }
        }
        Some(item)
    }

    pub fn lookup_by_remote(&self, remote_id: &RemoteId) -> Option<&Item> {
        self.by_remote
            .get(remote_id)
            .and_then(|local_id| self.by_local.get(local_id))
    }

    pub fn local_for_remote(&self, remote_id: &RemoteId) -> Option<LocalId> {
        self.by_remote.get(remote_id).copied()
    }

    pub fn get(&self, local_id: LocalId) -> Option<&Item> {
        self.by_local.get(&local_id)
    }

    pub fn get_mut(&mut self, local_id: LocalId) -> Option<&mut Item> {
        self.by_local.get_mut(&local_id)
    }

    pub fn contains_local(&self, local_id: LocalId) -> bool {
        self.by_local.contains_key(&local_id)
    }

    pub fn contains_remote(&self, remote_id: &RemoteId) -> bool {
        self.by_remote.contains_key(remote_id)
    }

    /// Local ids in ascending (creation) order.
    pub fn local_ids(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.by_local.keys().copied()
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &RemoteId> {
        self.by_remote.keys()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.by_local.values()
    }

    pub fn len(&self) -> usize {
        self.by_local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_local.is_empty()
    }

    /// Number of items with a known remote identity.
    pub fn remote_len(&self) -> usize {
        self.by_remote.len()
    }
}
