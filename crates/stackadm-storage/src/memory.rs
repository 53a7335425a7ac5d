//! In-memory document store for testing.
//!
//! Documents live in a `BTreeMap` behind a `RwLock`. Nothing is persisted —
//! all data is lost when the process exits.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{DocumentStore, StorageError};

/// An in-memory document store.
///
/// Clones share the same underlying map, so a test can keep one handle for
/// assertions while the code under test writes through another.
///
/// # Examples
///
/// ```
/// # use stackadm_storage::{DocumentStore, MemoryStore};
/// # #[tokio::main]
/// # async fn main() {
/// let store = MemoryStore::new();
/// store.write("state.json", b"{}").await.unwrap();
/// assert_eq!(store.read("state.json").await.unwrap(), Some(b"{}".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.docs.read().await.get(name).cloned())
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.docs.write().await.insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    async fn append(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.docs
            .write()
            .await
            .entry(name.to_owned())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.docs.write().await.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.docs.read().await.contains_key(name))
    }
}
