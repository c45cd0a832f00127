//! The record store: a backend plus change notification.

use crate::backend::StoreBackend;
use crate::error::StorageResult;
use crate::live::{
    FilterSlot, Listener, LiveQuery, Predicate, QueryFingerprint, RecordSlot, Subscription,
    SubscriptionRegistry,
};
use crate::memory::MemoryBackend;
use crate::sqlite::SqliteBackend;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use visitflow_types::{Record, RecordId, RecordKey, RecordKind};

/// Keyed record storage with live queries.
///
/// Writes are committed one at a time; after each commit every subscription
/// the write could affect is re-evaluated and republished before the write
/// returns.
pub struct RecordStore {
    backend: Arc<dyn StoreBackend>,
    registry: SubscriptionRegistry,
    commit: Mutex<()>,
}

impl RecordStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StoreBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            registry: SubscriptionRegistry::default(),
            commit: Mutex::new(()),
        })
    }

    /// A store over a fresh [`MemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// A store over a SQLite file at `path`.
    pub fn open_sqlite(path: impl AsRef<Path>) -> StorageResult<Arc<Self>> {
        Ok(Self::new(Arc::new(SqliteBackend::open(path)?)))
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub async fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        self.backend.get(kind, id).await
    }

    /// Inserts or replaces a record and republishes affected live queries.
    pub async fn put(&self, record: Record) -> StorageResult<()> {
        record.validate()?;
        let _commit = self.commit.lock().await;
        self.backend.put(&record).await?;
        let key = record.key();
        debug!(
            "store[{}]: committed {} v{}",
            self.backend.backend_name(),
            key,
            record.version()
        );
        self.publish(&key, Some(&record)).await;
        Ok(())
    }

    /// Deletes a record. Returns whether it existed.
    pub async fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let _commit = self.commit.lock().await;
        let existed = self.backend.delete(kind, id).await?;
        if existed {
            let key = RecordKey::new(kind, id.clone());
            debug!("store[{}]: deleted {}", self.backend.backend_name(), key);
            self.publish(&key, None).await;
        }
        Ok(existed)
    }

    /// One-shot filter over a kind's collection.
    pub async fn query<F>(&self, kind: RecordKind, predicate: F) -> StorageResult<Vec<Record>>
    where
        F: Fn(&Record) -> bool,
    {
        let mut records = self.backend.scan(kind).await?;
        records.retain(|r| predicate(r));
        Ok(records)
    }

    /// Subscribes to one record. The returned query starts out loading; the
    /// initial read runs on the current tokio runtime.
    #[must_use]
    pub fn watch_record(self: &Arc<Self>, kind: RecordKind, id: RecordId) -> LiveQuery<Option<Record>> {
        let key = RecordKey::new(kind, id);
        let fingerprint = QueryFingerprint::Record(key.clone());
        let (tx, rx) = watch::channel::<RecordSlot>(None);
        let tx = Arc::new(tx);
        let subscription_id = self.registry.register(Subscription {
            fingerprint: fingerprint.clone(),
            listener: Listener::Record(Arc::clone(&tx)),
        });

        let store = Arc::clone(self);
        tokio::spawn(async move {
            match store.backend.get(key.kind, &key.id).await {
                Ok(record) => publish_initial(&tx, record),
                Err(e) => warn!("store: initial read of {} failed: {}", key, e),
            }
        });

        LiveQuery::new(rx, Arc::clone(self), subscription_id, fingerprint)
    }

    /// Subscribes to every record of `kind` matching `predicate`. `label`
    /// names the filter in the subscription registry.
    #[must_use]
    pub fn watch_filter<F>(
        self: &Arc<Self>,
        kind: RecordKind,
        label: impl Into<String>,
        predicate: F,
    ) -> LiveQuery<Vec<Record>>
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        let fingerprint = QueryFingerprint::Filter {
            kind,
            label: label.into(),
        };
        let predicate: Predicate = Arc::new(predicate);
        let (tx, rx) = watch::channel::<FilterSlot>(None);
        let tx = Arc::new(tx);
        let subscription_id = self.registry.register(Subscription {
            fingerprint: fingerprint.clone(),
            listener: Listener::Filter {
                predicate: Arc::clone(&predicate),
                tx: Arc::clone(&tx),
            },
        });

        let store = Arc::clone(self);
        let log_fingerprint = fingerprint.clone();
        tokio::spawn(async move {
            match store.backend.scan(kind).await {
                Ok(records) => {
                    let matching: Vec<Record> = records.into_iter().filter(|r| predicate(r)).collect();
                    publish_initial(&tx, matching);
                }
                Err(e) => warn!("store: initial read of {} failed: {}", log_fingerprint, e),
            }
        });

        LiveQuery::new(rx, Arc::clone(self), subscription_id, fingerprint)
    }

    /// Fingerprints of every live subscription.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<QueryFingerprint> {
        self.registry.fingerprints()
    }

    pub(crate) fn release_subscription(&self, subscription_id: u64) {
        self.registry.remove(subscription_id);
    }

    pub(crate) async fn refresh_subscription(&self, subscription_id: u64) -> StorageResult<()> {
        let Some(subscription) = self.registry.get(subscription_id) else {
            return Ok(());
        };
        let _commit = self.commit.lock().await;
        match (&subscription.fingerprint, &subscription.listener) {
            (QueryFingerprint::Record(key), Listener::Record(tx)) => {
                let record = self.backend.get(key.kind, &key.id).await?;
                tx.send_replace(Some(record));
            }
            (fingerprint, Listener::Filter { predicate, tx }) => {
                let mut records = self.backend.scan(fingerprint.kind()).await?;
                records.retain(|r| predicate(r));
                tx.send_replace(Some(records));
            }
            (fingerprint, Listener::Record(_)) => {
                warn!("store: subscription {} has mismatched listener", fingerprint);
            }
        }
        Ok(())
    }

    /// Republishes every subscription affected by a committed write to `key`.
    /// `written` is the new record, or `None` after a delete. Must be called
    /// with the commit lock held.
    async fn publish(&self, key: &RecordKey, written: Option<&Record>) {
        let affected = self.registry.affected_by(key);
        if affected.is_empty() {
            return;
        }

        // Filter queries share one scan per kind.
        let mut scans: HashMap<RecordKind, Option<Vec<Record>>> = HashMap::new();
        for subscription in affected {
            match subscription.listener {
                Listener::Record(tx) => {
                    tx.send_replace(Some(written.cloned()));
                }
                Listener::Filter { predicate, tx } => {
                    let kind = key.kind;
                    if !scans.contains_key(&kind) {
                        let scanned = match self.backend.scan(kind).await {
                            Ok(records) => Some(records),
                            Err(e) => {
                                warn!("store: rescan of {} after write failed: {}", kind, e);
                                None
                            }
                        };
                        scans.insert(kind, scanned);
                    }
                    if let Some(Some(records)) = scans.get(&kind) {
                        let matching: Vec<Record> =
                            records.iter().filter(|r| predicate(r)).cloned().collect();
                        tx.send_replace(Some(matching));
                    }
                }
            }
        }
    }
}

/// Publishes an initial read unless a commit already published a newer one.
fn publish_initial<T>(tx: &watch::Sender<Option<T>>, value: T) {
    tx.send_if_modified(|slot| {
        if slot.is_none() {
            *slot = Some(value);
            true
        } else {
            false
        }
    });
}
