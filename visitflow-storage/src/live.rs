//! Live queries over the record store.
//!
//! A [`LiveQuery`] is a scoped subscription: it holds the current result of a
//! read query and is republished by the store after every committed write
//! that could change that result. Dropping the query releases the
//! subscription.

use crate::error::StorageResult;
use crate::store::RecordStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use visitflow_types::{Record, RecordKey, RecordKind};

pub(crate) type Predicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Identifies what a subscription is watching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryFingerprint {
    /// Point lookup of one record.
    Record(RecordKey),
    /// Filter over one kind's collection, named by the caller.
    Filter { kind: RecordKind, label: String },
}

impl QueryFingerprint {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Record(key) => key.kind,
            Self::Filter { kind, .. } => *kind,
        }
    }

    /// Whether a write to `key` could change this query's result.
    #[must_use]
    pub fn is_affected_by(&self, key: &RecordKey) -> bool {
        match self {
            Self::Record(watched) => watched == key,
            Self::Filter { kind, .. } => *kind == key.kind,
        }
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(key) => write!(f, "record:{key}"),
            Self::Filter { kind, label } => write!(f, "filter:{kind}:{label}"),
        }
    }
}

pub(crate) type RecordSlot = Option<Option<Record>>;
pub(crate) type FilterSlot = Option<Vec<Record>>;

/// Where a subscription's results are published. `None` inside the channel
/// means the first read has not completed yet.
#[derive(Clone)]
pub(crate) enum Listener {
    Record(Arc<watch::Sender<RecordSlot>>),
    Filter {
        predicate: Predicate,
        tx: Arc<watch::Sender<FilterSlot>>,
    },
}

#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) fingerprint: QueryFingerprint,
    pub(crate) listener: Listener,
}

/// Registry of active subscriptions, keyed by subscription id.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Subscription>>,
}

impl SubscriptionRegistry {
    pub(crate) fn register(&self, subscription: Subscription) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, subscription);
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub(crate) fn get(&self, id: u64) -> Option<Subscription> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Subscriptions a write to `key` could affect.
    pub(crate) fn affected_by(&self, key: &RecordKey) -> Vec<Subscription> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.fingerprint.is_affected_by(key))
            .cloned()
            .collect()
    }

    pub(crate) fn fingerprints(&self) -> Vec<QueryFingerprint> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.fingerprint.clone())
            .collect()
    }
}

/// A live view of a query result.
///
/// `current()` is `None` while the initial read is outstanding, then the
/// latest result: `Some(None)` / `Some(vec![])` when nothing matches.
pub struct LiveQuery<T> {
    rx: watch::Receiver<Option<T>>,
    store: Arc<RecordStore>,
    subscription_id: u64,
    fingerprint: QueryFingerprint,
}

impl<T: Clone> LiveQuery<T> {
    pub(crate) fn new(
        rx: watch::Receiver<Option<T>>,
        store: Arc<RecordStore>,
        subscription_id: u64,
        fingerprint: QueryFingerprint,
    ) -> Self {
        Self {
            rx,
            store,
            subscription_id,
            fingerprint,
        }
    }

    /// The latest published result, or `None` while loading.
    #[must_use]
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.rx.borrow().is_none()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &QueryFingerprint {
        &self.fingerprint
    }

    /// Waits for the next publication. Returns `false` once the store has
    /// gone away and no further results will arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Waits until the initial read has completed and returns the result.
    pub async fn ready(&mut self) -> Option<T> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }

    /// A receiver that observes the same publications. It does not keep the
    /// subscription alive on its own.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    /// Re-runs the query against the store and republishes the result.
    pub async fn refresh(&self) -> StorageResult<()> {
        self.store.refresh_subscription(self.subscription_id).await
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.store.release_subscription(self.subscription_id);
    }
}

impl<T> fmt::Debug for LiveQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("subscription_id", &self.subscription_id)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
