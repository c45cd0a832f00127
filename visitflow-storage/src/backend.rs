//! Storage backend abstraction.
//!
//! A backend is a dumb keyed document store: point reads, whole-record
//! writes, deletes and a per-kind scan. Change notification lives one level
//! up, in [`RecordStore`](crate::RecordStore).

use crate::error::StorageResult;
use async_trait::async_trait;
use visitflow_types::{Record, RecordId, RecordKind};

#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Name used in log lines.
    fn backend_name(&self) -> &'static str;

    /// Reads one record.
    async fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>>;

    /// Inserts or replaces a whole record.
    async fn put(&self, record: &Record) -> StorageResult<()>;

    /// Deletes a record. Returns whether it existed.
    async fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool>;

    /// Returns every record of a kind, ordered by id.
    async fn scan(&self, kind: RecordKind) -> StorageResult<Vec<Record>>;
}
