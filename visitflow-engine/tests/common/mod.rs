//! Shared test helpers for engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use visitflow_engine::manual::ManualScheduler;
use visitflow_engine::{Engine, EngineConfig, Scheduler};
use visitflow_storage::{MemoryBackend, RecordStore, StorageError, StorageResult, StoreBackend};
use visitflow_sync::provider::mock::MockProvider;
use visitflow_sync::{MemoryReferenceStore, MetadataSyncConfig, MetadataSyncManager};
use visitflow_types::{FieldMap, FieldValue, Record, RecordId, RecordKey, RecordKind, Timestamp, VisitRecord};

pub const DEBOUNCE: Duration = Duration::from_millis(300);

pub fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn id(s: &str) -> RecordId {
    RecordId::parse(s).unwrap()
}

pub fn key(s: &str) -> RecordKey {
    RecordKey::visit(id(s))
}

pub fn visit(record_id: &str) -> Record {
    VisitRecord::draft(id(record_id), "stage-anc", id("EN1"), ts(1_000)).into()
}

pub fn fields<const N: usize>(pairs: [(&str, FieldValue); N]) -> FieldMap {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Backend that counts writes, can fail writes, and can hold the next read.
#[derive(Default)]
pub struct TestBackend {
    inner: MemoryBackend,
    puts: AtomicUsize,
    written: Mutex<Vec<Record>>,
    fail_puts: AtomicBool,
    hold_next_get: AtomicBool,
    pub get_entered: Notify,
    pub release_get: Notify,
}

impl TestBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writes a record without going through the store.
    pub async fn seed(&self, record: Record) {
        self.inner.put(&record).await.unwrap();
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Record> {
        self.written.lock().unwrap().clone()
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn hold_next_get(&self) {
        self.hold_next_get.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreBackend for TestBackend {
    fn backend_name(&self) -> &'static str {
        "test"
    }

    async fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        if self.hold_next_get.swap(false, Ordering::SeqCst) {
            self.get_entered.notify_one();
            self.release_get.notified().await;
        }
        self.inner.get(kind, id).await
    }

    async fn put(&self, record: &Record) -> StorageResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidData("disk unavailable".into()));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.written.lock().unwrap().push(record.clone());
        self.inner.put(record).await
    }

    async fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        self.inner.delete(kind, id).await
    }

    async fn scan(&self, kind: RecordKind) -> StorageResult<Vec<Record>> {
        self.inner.scan(kind).await
    }
}

pub struct Harness {
    pub engine: Engine,
    pub scheduler: Arc<ManualScheduler>,
    pub backend: Arc<TestBackend>,
    pub store: Arc<RecordStore>,
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    let backend = TestBackend::new();
    let store = RecordStore::new(backend.clone());
    let scheduler = Arc::new(ManualScheduler::new(ts(10_000)));
    let metadata = MetadataSyncManager::open(
        Arc::new(MockProvider::new()),
        Arc::new(MemoryReferenceStore::new()),
        scheduler.clone(),
        MetadataSyncConfig::default(),
    )
    .await
    .unwrap();
    let dyn_scheduler: Arc<dyn Scheduler> = scheduler.clone();
    let engine = Engine::new(store.clone(), dyn_scheduler, Arc::new(metadata), config);
    Harness {
        engine,
        scheduler,
        backend,
        store,
    }
}

/// Lets spawned tasks (initial loads, background flushes) run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub async fn stored(store: &RecordStore, record_id: &str) -> Record {
    store
        .get(RecordKind::Visit, &id(record_id))
        .await
        .unwrap()
        .expect("record exists")
}
