//! # Syncstore Engine
//!
//! Keeps a locally editable collection of records consistent with a remote
//! collection that is only reachable through coarse CRUD calls.
//!
//! The host owns a [`LiveCollection`] and edits it freely. The [`Store`]
//! reconciles in both directions:
//!
//! - **Inbound**: [`Store::load`] and [`Store::sync_one`] fold remote data into
//!   the collection. Unknown records are appended, changed ones overwritten,
//!   vanished ones removed.
//! - **Outbound**: after [`Store::notify_changed`] (debounced), every entry is
//!   compared against the baseline remembered for it. New entries are created
//!   remotely, changed ones updated, removed ones deleted.
//!
//! Every transition is reported through named events ([`EventKind`]). The
//! first bulk load is silent.
//!
//! ## Core Concepts
//!
//! ### Items
//!
//! The engine wraps each record it sees in an [`Item`]: a process-unique
//! local id, the remote id once known, and a baseline snapshot of the fields
//! last known to match the remote. Hidden fields (UI-only state) are left out
//! of both the comparison and the payloads sent to the remote.
//!
//! ### Identity
//!
//! The [`IdentityRegistry`] maps local ids to items and remote ids to local
//! ids. A record created locally has no remote id until its create call
//! returns.
//!
//! ### Conflicts
//!
//! Inbound data always wins: a remote change overwrites an unsent local edit
//! to the same record.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use syncstore_engine::{MemoryResource, Store, StoreConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> syncstore_engine::Result<()> {
//! let resource = Arc::new(MemoryResource::new("id"));
//! let config = StoreConfig::new("todos", "memory://todos", "id");
//! let store = Store::new(config, resource.clone())?;
//! store.load().await?;
//!
//! // The host adds a record...
//! let todos = store.collection();
//! todos.push(json!({"title": "buy milk"}).as_object().cloned().unwrap());
//!
//! // ...and the next outbound pass creates it remotely.
//! let pass = store.flush().await;
//! assert_eq!(pass.creates, 1);
//! assert_eq!(resource.len(), 1);
//! assert_eq!(todos.read()[0].value["id"], json!(1));
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod config;
pub mod debounce;
pub mod error;
pub mod events;
#[cfg(feature = "http")]
pub mod http;
pub mod item;
pub mod memory;
pub mod registry;
pub mod resource;
pub mod store;

// Re-export main types at crate root
pub use collection::{Entry, LiveCollection};
pub use config::{HttpVerb, MethodDef, StoreConfig, DEFAULT_DEBOUNCE_WINDOW_MS};
pub use debounce::{DebounceMode, DebounceState, Debouncer};
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, ItemSnapshot, ListenerId, RemoteOp, StoreEvent};
#[cfg(feature = "http")]
pub use http::HttpResource;
pub use item::{FieldPolicy, Item, RemoteId};
pub use memory::{MemoryResource, ResourceCall};
pub use registry::IdentityRegistry;
pub use resource::{Pagination, Resource};
pub use store::{ChangeNotifier, MergeSummary, ReconcilePass, Store, SyncOutcome};

/// A record: an open-ended mapping of fields.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Process-unique identifier assigned when a record is first wrapped.
pub type LocalId = u64;
