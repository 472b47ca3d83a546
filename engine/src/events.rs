//! Named event listeners with suppression.

use crate::{Error, LocalId, Record, RemoteId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Names of the events a store emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A local record was created remotely
    Create,
    /// A local edit was saved remotely
    Update,
    /// A local removal was deleted remotely
    Delete,
    /// A record appeared remotely
    CreateRemote,
    /// A record changed remotely
    UpdateRemote,
    /// A record disappeared remotely
    DeleteRemote,
    /// A remote call failed
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Create,
        EventKind::Update,
        EventKind::Delete,
        EventKind::CreateRemote,
        EventKind::UpdateRemote,
        EventKind::DeleteRemote,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::CreateRemote => "create_remote",
            EventKind::UpdateRemote => "update_remote",
            EventKind::DeleteRemote => "delete_remote",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "err" => Ok(EventKind::Error),
            _ => EventKind::ALL
                .into_iter()
                .find(|kind| kind.as_str() == name)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown event name: {name}"))),
        }
    }
}

/// Remote operation an error event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteOp {
    FetchAll,
    FetchOne,
    Create,
    Update,
    Delete,
}

/// Copy of an item at the moment an event was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSnapshot {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub value: Record,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Create {
        response: Record,
        item: ItemSnapshot,
    },
    Update {
        response: Record,
        item: ItemSnapshot,
    },
    Delete {
        item: ItemSnapshot,
    },
    CreateRemote {
        item: ItemSnapshot,
    },
    UpdateRemote {
        record: Record,
        item: ItemSnapshot,
    },
    DeleteRemote {
        item: ItemSnapshot,
    },
    Error {
        op: RemoteOp,
        error: Error,
        item: Option<ItemSnapshot>,
    },
}

impl StoreEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StoreEvent::Create { .. } => EventKind::Create,
            StoreEvent::Update { .. } => EventKind::Update,
            StoreEvent::Delete { .. } => EventKind::Delete,
            StoreEvent::CreateRemote { .. } => EventKind::CreateRemote,
            StoreEvent::UpdateRemote { .. } => EventKind::UpdateRemote,
            StoreEvent::DeleteRemote { .. } => EventKind::DeleteRemote,
            StoreEvent::Error { .. } => EventKind::Error,
        }
    }

    /// The item this event is about, if any.
    pub fn item(&self) -> Option<&ItemSnapshot> {
        match self {
            StoreEvent::Create { item, .. }
            | StoreEvent::Update { item, .. }
            | StoreEvent::Delete { item }
            | StoreEvent::CreateRemote { item }
            | StoreEvent::UpdateRemote { item, .. }
            | StoreEvent::DeleteRemote { item } => Some(item),
            StoreEvent::Error { item, .. } => item.as_ref(),
        }
    }
}

/// A registered event handler.
pub type Handler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Token returned by [`EventBus::on`], used to remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener table keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Handler)>>>,
    next_id: AtomicU64,
    suppressed: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`. Handlers run in registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(handlers) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        before != handlers.len()
    }

    /// Invokes every handler for the event's kind, unless suppressed.
    ///
    /// The listener table is not locked while handlers run, so handlers may
    /// register or remove listeners.
    pub fn emit(&self, event: &StoreEvent) {
        if self.is_suppressed() {
            return;
        }
        let handlers: Vec<Handler> = match self.listeners.lock().get(&event.kind()) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => return,
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Sets suppression, or toggles it when `flag` is `None`. Returns the new
    /// state.
    pub fn suppress(&self, flag: Option<bool>) -> bool {
        match flag {
            Some(flag) => {
                self.suppressed.store(flag, Ordering::SeqCst);
                flag
            }
            None => !self.suppressed.fetch_xor(true, Ordering::SeqCst),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Number of handlers registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("suppressed", &self.is_suppressed())
            .finish_non_exhaustive()
    }
}
