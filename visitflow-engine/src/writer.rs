//! Debounced, per-record write queue.
//!
//! Field edits are queued in memory and written to the store as one
//! read-merge-write per debounce window. The queue is not durable: anything
//! still queued when the process dies is lost.

use crate::config::WriterConfig;
use crate::error::{EngineError, EngineResult};
use crate::locks::FlushLocks;
use crate::scheduler::{timer_task, Scheduler, TimerId};
use crate::status::ReadinessPredicate;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use visitflow_storage::{RecordStore, StorageError};
use visitflow_types::{FieldId, FieldMap, FieldValue, Record, RecordKey, SyncStatus};

#[derive(Default)]
struct WriteQueue {
    pending: FieldMap,
    timer: Option<TimerId>,
    /// Bumped on every reschedule so a stale timer can tell it was replaced.
    generation: u64,
    last_error: Option<String>,
}

struct WriterInner {
    key: RecordKey,
    store: Arc<RecordStore>,
    scheduler: Arc<dyn Scheduler>,
    locks: Arc<FlushLocks>,
    debounce: Duration,
    queue: Mutex<WriteQueue>,
}

/// Batched writer bound to one record.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct BatchedWriter {
    inner: Arc<WriterInner>,
}

impl BatchedWriter {
    #[must_use]
    pub fn new(
        key: RecordKey,
        store: Arc<RecordStore>,
        scheduler: Arc<dyn Scheduler>,
        locks: Arc<FlushLocks>,
        config: &WriterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WriterInner {
                key,
                store,
                scheduler,
                locks,
                debounce: config.debounce(),
                queue: Mutex::new(WriteQueue::default()),
            }),
        }
    }

    #[must_use]
    pub fn key(&self) -> &RecordKey {
        &self.inner.key
    }

    fn queue(&self) -> MutexGuard<'_, WriteQueue> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues one field edit and restarts the debounce timer. Does not touch
    /// the store.
    pub fn update_field(&self, field: impl Into<FieldId>, value: impl Into<FieldValue>) {
        let mut queue = self.queue();
        queue.pending.insert(field.into(), value.into());
        if let Some(timer) = queue.timer.take() {
            self.inner.scheduler.cancel(timer);
        }
        queue.generation += 1;
        let generation = queue.generation;
        let writer = self.clone();
        let timer = self.inner.scheduler.schedule(
            self.inner.debounce,
            timer_task(async move { writer.flush_from_timer(generation).await }),
        );
        queue.timer = Some(timer);
    }

    /// Queues `fields` and flushes immediately, skipping the debounce window.
    pub async fn update_fields(&self, fields: FieldMap) -> EngineResult<()> {
        {
            let mut queue = self.queue();
            if let Some(timer) = queue.timer.take() {
                self.inner.scheduler.cancel(timer);
            }
            queue.pending.extend(fields);
        }
        self.flush().await
    }

    /// Writes everything queued so far.
    ///
    /// Holds the record's flush lock for the whole read-merge-write. The
    /// queue is swapped out once the lock is held, so edits queued while the
    /// write is in flight go to the next flush.
    pub async fn flush(&self) -> EngineResult<()> {
        let key = &self.inner.key;
        let _flush = self.inner.locks.acquire(key).await;

        let delta = std::mem::take(&mut self.queue().pending);
        if delta.is_empty() {
            return Ok(());
        }

        let mut record = match self.inner.store.get(key.kind, &key.id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("writer: {} not found, dropping {} field(s)", key, delta.len());
                return Err(EngineError::NotFound {
                    key: key.clone(),
                    dropped: delta,
                });
            }
            Err(e) => {
                self.requeue(delta);
                return Err(e.into());
            }
        };

        let fields = delta.len();
        record.merge_values(delta.clone());
        record.touch(self.inner.scheduler.now());
        let version = record.version();
        match self.inner.store.put(record).await {
            Ok(()) => {}
            Err(e @ StorageError::InvalidData(_)) => {
                warn!("writer: {} rejected {} field(s): {}", key, fields, e);
                return Err(e.into());
            }
            Err(e) => {
                self.requeue(delta);
                return Err(e.into());
            }
        }

        self.queue().last_error = None;
        debug!("writer: flushed {} field(s) to {} (v{})", fields, key, version);
        Ok(())
    }

    /// Puts a failed delta back, under any newer edits to the same fields.
    fn requeue(&self, delta: FieldMap) {
        let mut queue = self.queue();
        for (field, value) in delta {
            queue.pending.entry(field).or_insert(value);
        }
    }

    async fn flush_from_timer(&self, generation: u64) {
        {
            let mut queue = self.queue();
            if queue.generation == generation {
                queue.timer = None;
            }
        }
        if let Err(e) = self.flush().await {
            warn!("writer: debounced flush of {} failed: {}", self.inner.key, e);
            self.queue().last_error = Some(e.to_string());
        }
    }

    /// Cancels the debounce timer without flushing. Returns whether one was
    /// armed.
    pub fn cancel_timer(&self) -> bool {
        match self.queue().timer.take() {
            Some(timer) => self.inner.scheduler.cancel(timer),
            None => false,
        }
    }

    #[must_use]
    pub fn has_pending_edits(&self) -> bool {
        !self.queue().pending.is_empty()
    }

    /// The queued value for `field`, if any.
    #[must_use]
    pub fn pending_value(&self, field: &str) -> Option<FieldValue> {
        self.queue().pending.get(field).cloned()
    }

    /// A copy of everything queued.
    #[must_use]
    pub fn pending(&self) -> FieldMap {
        self.queue().pending.clone()
    }

    /// The error from the last debounced flush, cleared by the next
    /// successful flush.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.queue().last_error.clone()
    }

    /// Moves the record along its sync lifecycle.
    ///
    /// Runs under the flush lock so it cannot interleave with a flush of the
    /// same record.
    pub async fn transition_status(
        &self,
        next: SyncStatus,
        error: Option<String>,
    ) -> EngineResult<Record> {
        let key = &self.inner.key;
        let _flush = self.inner.locks.acquire(key).await;

        let mut record = self.load(key).await?;
        let from = record.sync_status();
        if !from.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                key: key.clone(),
                from,
                to: next,
            });
        }
        record.set_sync_status(next, error);
        record.touch(self.inner.scheduler.now());
        self.inner.store.put(record.clone()).await?;
        info!("writer: {} {} -> {}", key, from, next);
        Ok(record)
    }

    /// Promotes a draft to pending when `readiness` accepts it. Returns
    /// whether the record was promoted.
    pub async fn promote_if_ready(&self, readiness: &dyn ReadinessPredicate) -> EngineResult<bool> {
        let key = &self.inner.key;
        let _flush = self.inner.locks.acquire(key).await;

        let mut record = self.load(key).await?;
        if record.sync_status() != SyncStatus::Draft || !readiness.is_ready(&record) {
            return Ok(false);
        }
        record.set_sync_status(SyncStatus::Pending, None);
        record.touch(self.inner.scheduler.now());
        self.inner.store.put(record).await?;
        info!("writer: {} ready, draft -> pending", key);
        Ok(true)
    }

    async fn load(&self, key: &RecordKey) -> EngineResult<Record> {
        self.inner
            .store
            .get(key.kind, &key.id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                key: key.clone(),
                dropped: FieldMap::new(),
            })
    }
}
