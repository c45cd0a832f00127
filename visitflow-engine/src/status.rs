//! Sync-status projection.
//!
//! A [`SyncStatusBinding`] derives a small status summary from the live
//! record. It holds no state of its own.

use visitflow_storage::LiveQuery;
use visitflow_types::{Record, RecordKey, SyncStatus};

/// Decides whether a draft record is complete enough to queue for upload.
pub trait ReadinessPredicate: Send + Sync {
    fn is_ready(&self, record: &Record) -> bool;
}

impl<F> ReadinessPredicate for F
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn is_ready(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Status summary for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatusSnapshot {
    /// `None` when the record does not exist.
    pub status: Option<SyncStatus>,
    pub is_pending: bool,
    pub is_syncing: bool,
    pub has_failed: bool,
    /// Upload error, only set for failed records.
    pub error: Option<String>,
}

impl SyncStatusSnapshot {
    #[must_use]
    pub fn derive(record: Option<&Record>) -> Self {
        let Some(record) = record else {
            return Self::default();
        };
        let status = record.sync_status();
        let has_failed = status == SyncStatus::Failed;
        Self {
            status: Some(status),
            is_pending: status == SyncStatus::Pending,
            is_syncing: status == SyncStatus::Syncing,
            has_failed,
            error: if has_failed {
                record.sync_error().map(str::to_owned)
            } else {
                None
            },
        }
    }
}

/// Live sync status of one record.
pub struct SyncStatusBinding {
    key: RecordKey,
    record: LiveQuery<Option<Record>>,
}

impl SyncStatusBinding {
    pub(crate) fn new(key: RecordKey, record: LiveQuery<Option<Record>>) -> Self {
        Self { key, record }
    }

    #[must_use]
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Current summary, or `None` while the record is loading.
    #[must_use]
    pub fn current(&self) -> Option<SyncStatusSnapshot> {
        self.record
            .current()
            .map(|record| SyncStatusSnapshot::derive(record.as_ref()))
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.record.is_loading()
    }

    /// Waits for the record to be republished. Returns `false` once the
    /// store has gone away.
    pub async fn changed(&mut self) -> bool {
        self.record.changed().await
    }

    /// Waits for the initial read and returns the summary.
    pub async fn ready(&mut self) -> SyncStatusSnapshot {
        let record = self.record.ready().await.flatten();
        SyncStatusSnapshot::derive(record.as_ref())
    }
}
