//! Metadata sync manager.
//!
//! The single owner of [`MetadataSyncState`]. Checks the remote for changed
//! reference-data types and applies them type by type. A failure part way
//! through a full sync leaves the types applied so far committed; a retry is
//! a new explicit call.

use crate::error::{SyncError, SyncPhase, SyncResult};
use crate::provider::MetadataProvider;
use crate::reference_store::{content_fingerprint, ReferenceStore};
use crate::state::{MetadataSyncState, MetadataSyncStatus, SyncProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use visitflow_types::{Clock, Timestamp};

/// Configuration for the metadata sync manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSyncConfig {
    /// Reference data older than this is stale (seconds).
    pub stale_after_secs: u64,
}

impl Default for MetadataSyncConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 86_400,
        }
    }
}

impl MetadataSyncConfig {
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Outcome of a successful full sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub synced_types: Vec<String>,
    pub finished_at: Timestamp,
}

/// Handle returned by [`MetadataSyncManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&MetadataSyncState) + Send + Sync>;

/// Progress callback for [`MetadataSyncManager::full_sync`].
pub type ProgressCallback<'a> = &'a (dyn Fn(&SyncProgress) + Send + Sync);

/// Clears the running flag when an operation ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MetadataSyncManager {
    provider: Arc<dyn MetadataProvider>,
    store: Arc<dyn ReferenceStore>,
    clock: Arc<dyn Clock>,
    config: MetadataSyncConfig,
    state: watch::Sender<MetadataSyncState>,
    listeners: Mutex<BTreeMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    running: AtomicBool,
}

impl MetadataSyncManager {
    /// Creates the manager in `idle`, with the last sync time read from
    /// `store`.
    pub async fn open(
        provider: Arc<dyn MetadataProvider>,
        store: Arc<dyn ReferenceStore>,
        clock: Arc<dyn Clock>,
        config: MetadataSyncConfig,
    ) -> SyncResult<Self> {
        let last_sync = store.last_sync().await?;
        let (state, _) = watch::channel(MetadataSyncState {
            last_sync,
            ..MetadataSyncState::default()
        });
        debug!("metadata: opened, last sync {:?}", last_sync);
        Ok(Self {
            provider,
            store,
            clock,
            config,
            state,
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(0),
            running: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn config(&self) -> &MetadataSyncConfig {
        &self.config
    }

    #[must_use]
    pub fn reference_store(&self) -> &Arc<dyn ReferenceStore> {
        &self.store
    }

    /// A copy of the current state.
    #[must_use]
    pub fn state(&self) -> MetadataSyncState {
        self.state.borrow().clone()
    }

    /// Receiver of every transition, for async observers.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<MetadataSyncState> {
        self.state.subscribe()
    }

    /// Registers a listener called synchronously with the new state after
    /// every transition. Past transitions are not replayed; read
    /// [`state`](Self::state) for the state at attach time.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MetadataSyncState) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners().insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners().remove(&id).is_some()
    }

    /// Drops every listener.
    pub fn shutdown(&self) {
        self.listeners().clear();
        debug!("metadata: listeners released");
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, Listener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, update: impl FnOnce(&mut MetadataSyncState)) {
        self.state.send_modify(update);
        let snapshot = self.state();
        // Listeners run without the registry lock so they may unsubscribe.
        let listeners: Vec<Listener> = self.listeners().values().cloned().collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn begin(&self) -> SyncResult<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| RunGuard(&self.running))
            .map_err(|_| SyncError::AlreadyRunning)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the remote which reference-data types changed. Never touches
    /// local reference data.
    pub async fn check_for_updates(&self) -> SyncResult<Vec<String>> {
        let _run = self.begin()?;
        self.transition(|s| {
            s.status = MetadataSyncStatus::Checking;
            s.error = None;
            s.changed_types = None;
        });
        info!("metadata: checking for updates");

        match self.list_changed().await {
            Ok(changed) => {
                info!("metadata: {} type(s) changed", changed.len());
                self.transition(|s| {
                    s.status = MetadataSyncStatus::Success;
                    s.changed_types = Some(changed.clone());
                });
                Ok(changed)
            }
            Err(e) => {
                self.fail(SyncPhase::Listing, &e);
                Err(e)
            }
        }
    }

    async fn list_changed(&self) -> SyncResult<Vec<String>> {
        let local = self.store.versions().await?;
        self.provider.list_changed_types(&local).await
    }

    /// [`full_sync`](Self::full_sync) without a progress callback.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        self.full_sync(None).await
    }

    /// Downloads and applies every changed type, one at a time.
    ///
    /// `on_progress` is called after each applied type. On failure the state
    /// goes to `error` with the progress reached so far; applied types are
    /// not rolled back and later types are not attempted.
    pub async fn full_sync(&self, on_progress: Option<ProgressCallback<'_>>) -> SyncResult<SyncReport> {
        let _run = self.begin()?;
        self.transition(|s| {
            s.status = MetadataSyncStatus::Syncing;
            s.error = None;
            s.progress = None;
            s.completed_types.clear();
        });
        info!("metadata: full sync started");

        let types = match self.list_changed().await {
            Ok(types) => types,
            Err(e) => {
                self.fail(SyncPhase::Listing, &e);
                return Err(e);
            }
        };
        let total = types.len();
        self.transition(|s| {
            s.progress = Some(SyncProgress::new(0, total, ""));
            s.changed_types = Some(types.clone());
        });

        let mut completed: Vec<String> = Vec::with_capacity(total);
        for type_name in &types {
            if let Err((phase, message)) = self.sync_type(type_name).await {
                let err = SyncError::TypeFailed {
                    phase,
                    type_name: type_name.clone(),
                    completed: completed.len(),
                    message,
                };
                self.fail(phase, &err);
                return Err(err);
            }
            completed.push(type_name.clone());
            let progress = SyncProgress::new(completed.len(), total, type_name.as_str());
            debug!(
                "metadata: applied {} ({}/{})",
                type_name, progress.completed, progress.total
            );
            self.transition(|s| {
                s.progress = Some(progress.clone());
                s.completed_types = completed.clone();
            });
            if let Some(on_progress) = on_progress {
                on_progress(&progress);
            }
        }

        let finished_at = self.clock.now();
        if let Err(e) = self.store.set_last_sync(finished_at).await {
            self.fail(SyncPhase::Finishing, &e);
            return Err(e);
        }
        self.transition(|s| {
            s.status = MetadataSyncStatus::Success;
            s.last_sync = Some(finished_at);
        });
        info!("metadata: full sync finished, {} type(s) applied", completed.len());
        Ok(SyncReport {
            synced_types: completed,
            finished_at,
        })
    }

    async fn sync_type(&self, type_name: &str) -> Result<(), (SyncPhase, String)> {
        let batch = self
            .provider
            .fetch_type(type_name)
            .await
            .map_err(|e| (SyncPhase::Fetching, e.to_string()))?;
        let fingerprint = match batch.fingerprint {
            Some(fingerprint) => fingerprint,
            None => content_fingerprint(&batch.records)
                .map_err(|e| (SyncPhase::Applying, e.to_string()))?,
        };
        self.store
            .apply(type_name, &fingerprint, &batch.records)
            .await
            .map_err(|e| (SyncPhase::Applying, e.to_string()))
    }

    fn fail(&self, phase: SyncPhase, err: &SyncError) {
        warn!("metadata: {} failed: {}", phase, err);
        let message = match err {
            SyncError::TypeFailed { .. } => err.to_string(),
            other => format!("{phase}: {other}"),
        };
        self.transition(|s| {
            s.status = MetadataSyncStatus::Error;
            s.error = Some(message);
        });
    }

    /// When reference data was last fully synced.
    #[must_use]
    pub fn last_sync(&self) -> Option<Timestamp> {
        self.state.borrow().last_sync
    }

    /// Whether the reference data is older than the configured threshold.
    /// Never synced counts as stale.
    #[must_use]
    pub fn is_metadata_stale(&self) -> bool {
        let Some(last_sync) = self.last_sync() else {
            return true;
        };
        let age_ms = (self.clock.now() - last_sync).num_milliseconds();
        let threshold_ms =
            i64::try_from(self.config.stale_after().as_millis()).unwrap_or(i64::MAX);
        age_ms > threshold_ms
    }
}
