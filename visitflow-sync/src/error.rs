//! Error types for the metadata sync layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Step of a sync operation, reported with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Asking the remote which types changed.
    Listing,
    /// Downloading one type.
    Fetching,
    /// Writing one type into the local reference store.
    Applying,
    /// Recording the sync time.
    Finishing,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listing => "listing",
            Self::Fetching => "fetching",
            Self::Applying => "applying",
            Self::Finishing => "finishing",
        })
    }
}

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote metadata provider failed.
    #[error("remote error: {0}")]
    Remote(String),

    /// Local reference store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// One reference-data type failed; the types before it stay applied.
    #[error("{phase} {type_name} failed after {completed} type(s): {message}")]
    TypeFailed {
        phase: SyncPhase,
        type_name: String,
        completed: usize,
        message: String,
    },

    /// A check or sync is already in flight.
    #[error("a metadata check or sync is already running")]
    AlreadyRunning,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Storage(format!("store task failed: {err}"))
    }
}
