//! Core type definitions for visitflow.
//!
//! This crate defines the plain data shared by every other crate:
//! - Record identifiers and keys
//! - Field values and the open-ended data-values / attributes map
//! - Visit and subject records with their sync-status lifecycle
//! - A clock abstraction so time can be virtual in tests
//!
//! Nothing here performs I/O.

mod clock;
mod ids;
mod record;
mod status;
mod value;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use ids::{RecordId, RecordKey, RecordKind};
pub use record::{Enrollment, Record, SubjectRecord, VisitRecord};
pub use status::SyncStatus;
pub use value::{FieldId, FieldMap, FieldValue, Scalar};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record id: {0:?}")]
    InvalidRecordId(String),

    #[error("unknown record kind: {0:?}")]
    InvalidKind(String),

    #[error("invalid sync status: {0:?}")]
    InvalidStatus(String),

    #[error("field {0:?} holds a non-finite number")]
    NonFiniteValue(String),
}
