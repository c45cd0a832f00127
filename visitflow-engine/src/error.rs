//! Error types for the engine.

use thiserror::Error;
use visitflow_model::RuleMessage;
use visitflow_storage::StorageError;
use visitflow_sync::SyncError;
use visitflow_types::{FieldMap, RecordKey, SyncStatus};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by bindings, writers and triggers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The flush target is not in the store. The queued delta was removed
    /// from the writer and is handed back in `dropped`.
    #[error("record {key} not found; {} queued field(s) dropped", .dropped.len())]
    NotFound { key: RecordKey, dropped: FieldMap },

    /// Rule evaluation produced errors; nothing was written.
    #[error("submission blocked by {} validation error(s)", .messages.len())]
    ValidationBlocked { messages: Vec<RuleMessage> },

    /// A sync-status change outside the record lifecycle.
    #[error("invalid status transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: RecordKey,
        from: SyncStatus,
        to: SyncStatus,
    },

    /// Store failure. Any queued delta stays queued for the next flush.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Metadata sync failure while opening the engine.
    #[error("metadata sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
