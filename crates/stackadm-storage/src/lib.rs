//! Document storage abstraction for `stackadm`.
//!
//! This crate defines the [`DocumentStore`] trait — a tiny interface over
//! named byte documents that knows nothing about setup steps, backups, or
//! logs. The setup orchestrator in `stackadm-core` keeps its persisted state
//! and its step log behind this trait so it can run against disk in
//! production and against memory in tests.
//!
//! Two implementations are provided:
//!
//! - [`FileStore`] — production default, documents are files under a root directory
//! - [`MemoryStore`] — in-memory, for testing only

mod error;
mod file;
mod memory;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// A pluggable store of named documents.
///
/// Names are relative, `/`-separated paths (e.g. `.init-setup-state.json`).
/// Values are opaque bytes. Implementations must be safe to share across
/// async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Read a whole document.
    ///
    /// Returns `Ok(None)` if the document does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a document with `data`.
    ///
    /// Readers observe either the previous content or the new content, never
    /// a partially written document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Append `data` to a document, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn append(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Remove a document. Removing a missing document is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn remove(&self, name: &str) -> Result<(), StorageError>;

    /// Check whether a document exists.
    ///
    /// The default implementation calls [`read`](DocumentStore::read).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.read(name).await?.is_some())
    }
}
