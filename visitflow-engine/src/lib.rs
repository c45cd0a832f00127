//! Local-first visit data engine.
//!
//! Ties the record store, the rule evaluator and the metadata sync manager
//! together into the bindings a form screen uses:
//!
//! - [`RecordBinding`]: live record snapshot plus debounced writes
//!   ([`BatchedWriter`])
//! - [`RuleTrigger`]: rule evaluation with assignment and hidden-field
//!   side effects
//! - [`SyncStatusBinding`]: derived upload status of a record
//!
//! # Scheduling
//!
//! Debounce windows run through an injected [`Scheduler`]:
//! [`TokioScheduler`] in production and [`manual::ManualScheduler`] (a
//! virtual clock) in tests.
//!
//! # Ordering
//!
//! Flushes of the same record are serialized through [`FlushLocks`] shared
//! by every writer the engine hands out. Flushes of different records run
//! independently.

mod binding;
mod config;
mod error;
mod form;
mod locks;
mod scheduler;
mod status;
mod trigger;
mod writer;

pub use binding::RecordBinding;
pub use config::{EngineConfig, RuleTriggerConfig, WriterConfig, DEFAULT_DEBOUNCE_MS};
pub use error::{EngineError, EngineResult};
pub use form::LiveForm;
pub use locks::FlushLocks;
pub use scheduler::{manual, timer_task, Scheduler, SchedulerClock, TimerId, TimerTask, TokioScheduler};
pub use status::{ReadinessPredicate, SyncStatusBinding, SyncStatusSnapshot};
pub use trigger::RuleTrigger;
pub use writer::BatchedWriter;

use std::sync::Arc;
use tracing::info;
use visitflow_model::{RuleEvaluator, RuleSet};
use visitflow_storage::RecordStore;
use visitflow_sync::{MetadataProvider, MetadataSyncManager, ReferenceStore};
use visitflow_types::{Enrollment, RecordKey};

/// Owns the shared collaborators and hands out bindings.
///
/// One engine per process; pass it by reference to whatever needs a binding.
pub struct Engine {
    store: Arc<RecordStore>,
    scheduler: Arc<dyn Scheduler>,
    locks: Arc<FlushLocks>,
    metadata: Arc<MetadataSyncManager>,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(
        store: Arc<RecordStore>,
        scheduler: Arc<dyn Scheduler>,
        metadata: Arc<MetadataSyncManager>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            locks: Arc::new(FlushLocks::new()),
            metadata,
            config,
        }
    }

    /// Opens the metadata sync manager (loading the last sync time from
    /// `references`) and builds the engine around it.
    pub async fn open(
        store: Arc<RecordStore>,
        scheduler: Arc<dyn Scheduler>,
        provider: Arc<dyn MetadataProvider>,
        references: Arc<dyn ReferenceStore>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let clock = Arc::new(SchedulerClock(Arc::clone(&scheduler)));
        let metadata =
            MetadataSyncManager::open(provider, references, clock, config.metadata.clone()).await?;
        info!("engine: opened over {} store", store.backend_name());
        Ok(Self::new(store, scheduler, Arc::new(metadata), config))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<MetadataSyncManager> {
        &self.metadata
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A writer for `key` sharing the engine's flush locks.
    #[must_use]
    pub fn writer(&self, key: RecordKey) -> BatchedWriter {
        BatchedWriter::new(
            key,
            Arc::clone(&self.store),
            Arc::clone(&self.scheduler),
            Arc::clone(&self.locks),
            &self.config.writer,
        )
    }

    /// Binds a record for editing. Must be called within a tokio runtime.
    #[must_use]
    pub fn bind_record(&self, key: RecordKey) -> RecordBinding {
        let live = self.store.watch_record(key.kind, key.id.clone());
        RecordBinding::new(self.writer(key), live)
    }

    /// A rule trigger for the record behind `binding` and its form.
    /// `enrollment` overrides the record's own (visits carry none).
    #[must_use]
    pub fn rule_trigger(
        &self,
        binding: &RecordBinding,
        form: LiveForm,
        evaluator: Arc<dyn RuleEvaluator>,
        rules: Arc<RuleSet>,
        enrollment: Option<Enrollment>,
    ) -> RuleTrigger {
        let key = binding.key();
        RuleTrigger::new(
            evaluator,
            rules,
            form,
            self.store.watch_record(key.kind, key.id.clone()),
            binding.writer().clone(),
            Arc::clone(&self.scheduler),
            self.config.rules.clone(),
            enrollment,
        )
    }

    /// Live sync status of a record. Must be called within a tokio runtime.
    #[must_use]
    pub fn sync_status(&self, key: RecordKey) -> SyncStatusBinding {
        let live = self.store.watch_record(key.kind, key.id.clone());
        SyncStatusBinding::new(key, live)
    }
}
