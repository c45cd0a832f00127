//! Per-record binding: live snapshot plus batched writes.

use crate::error::EngineResult;
use crate::writer::BatchedWriter;
use tracing::error;
use visitflow_storage::LiveQuery;
use visitflow_types::{FieldId, FieldMap, FieldValue, Record, RecordKey};

/// What a form screen holds while it edits one record.
///
/// Close it with [`RecordBinding::close`] so the last edits are flushed
/// before teardown completes. A binding dropped without closing still
/// cancels its timer and flushes in the background on the current runtime.
pub struct RecordBinding {
    writer: BatchedWriter,
    record: LiveQuery<Option<Record>>,
    closed: bool,
}

impl RecordBinding {
    pub(crate) fn new(writer: BatchedWriter, record: LiveQuery<Option<Record>>) -> Self {
        Self {
            writer,
            record,
            closed: false,
        }
    }

    #[must_use]
    pub fn key(&self) -> &RecordKey {
        self.writer.key()
    }

    /// Latest persisted record. `None` while loading or when absent.
    #[must_use]
    pub fn snapshot(&self) -> Option<Record> {
        self.record.current().flatten()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.record.is_loading()
    }

    /// Waits for the record to be republished.
    pub async fn changed(&mut self) -> bool {
        self.record.changed().await
    }

    /// Waits for the initial read.
    pub async fn ready(&mut self) -> Option<Record> {
        self.record.ready().await.flatten()
    }

    pub fn update_field(&self, field: impl Into<FieldId>, value: impl Into<FieldValue>) {
        self.writer.update_field(field, value);
    }

    pub async fn update_fields(&self, fields: FieldMap) -> EngineResult<()> {
        self.writer.update_fields(fields).await
    }

    pub async fn flush(&self) -> EngineResult<()> {
        self.writer.flush().await
    }

    #[must_use]
    pub fn writer(&self) -> &BatchedWriter {
        &self.writer
    }

    /// Cancels the debounce timer and flushes whatever is still queued.
    /// Flush failures are logged, not returned.
    pub async fn close(mut self) {
        self.closed = true;
        self.writer.cancel_timer();
        if let Err(e) = self.writer.flush().await {
            error!("binding: teardown flush of {} failed: {}", self.writer.key(), e);
        }
    }
}

impl Drop for RecordBinding {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.writer.cancel_timer();
        if !self.writer.has_pending_edits() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let writer = self.writer.clone();
                handle.spawn(async move {
                    if let Err(e) = writer.flush().await {
                        error!("binding: teardown flush of {} failed: {}", writer.key(), e);
                    }
                });
            }
            Err(_) => error!(
                "binding: {} dropped outside a runtime with unflushed edits",
                self.writer.key()
            ),
        }
    }
}
