//! Storage error types.
//!
//! Every variant names the document involved so a failure can be diagnosed
//! from the log line alone.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read a document.
    #[error("failed to read '{name}': {reason}")]
    Read { name: String, reason: String },

    /// Failed to write or append to a document.
    #[error("failed to write '{name}': {reason}")]
    Write { name: String, reason: String },

    /// Failed to remove a document.
    #[error("failed to remove '{name}': {reason}")]
    Delete { name: String, reason: String },

    /// The document name escapes the store root or is empty.
    #[error("invalid document name '{name}'")]
    InvalidName { name: String },
}
