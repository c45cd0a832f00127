//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored document could not be decoded into a record.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The backend lock was poisoned by a panic in another thread.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl From<visitflow_types::Error> for StorageError {
    fn from(err: visitflow_types::Error) -> Self {
        match err {
            visitflow_types::Error::Serialization(e) => Self::Serialization(e),
            other => Self::InvalidData(other.to_string()),
        }
    }
}
