//! The resource collaborator: coarse CRUD access to the remote collection.

use crate::{error::Result, Error, Record, RemoteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paging parameters for [`Resource::fetch_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

impl Pagination {
    pub fn new(limit: Option<u64>, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Applies this page to an in-memory sequence.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = (self.offset as usize).min(items.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit as usize).min(items.len()),
            None => items.len(),
        };
        items[start..end].to_vec()
    }
}

/// Network access to the remote collection.
///
/// Implementations perform the actual calls; the store decides when to call
/// and what to do with the results.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Fetches a page of records.
    async fn fetch_all(&self, page: Pagination) -> Result<Vec<Record>>;

    /// Fetches one record. `Ok(None)` means the remote reports it does not
    /// exist.
    async fn fetch_one(&self, id: &RemoteId) -> Result<Option<Record>>;

    /// Creates a record and returns it with server-assigned fields.
    async fn create(&self, record: Record) -> Result<Record>;

    /// Replaces the record stored under `id`.
    async fn update(&self, id: &RemoteId, record: Record) -> Result<Record>;

    /// Deletes the record stored under `id`.
    async fn delete(&self, id: &RemoteId) -> Result<()>;

    /// Invokes an extra, implementation-specific method.
    async fn call(&self, method: &str, params: Record) -> Result<Value> {
        let _ = params;
        Err(Error::UnknownMethod(method.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_slices() {
        let items: Vec<u32> = (0..10).collect();

        assert_eq!(Pagination::default().slice(&items).len(), 10);
        assert_eq!(Pagination::new(Some(3), 0).slice(&items), vec![0, 1, 2]);
        assert_eq!(Pagination::new(Some(3), 8).slice(&items), vec![8, 9]);
        assert!(Pagination::new(Some(3), 20).slice(&items).is_empty());
        assert_eq!(Pagination::new(None, 7).slice(&items), vec![7, 8, 9]);
    }
}
