use crate::backend::StoreBackend;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use visitflow_types::{Record, RecordId, RecordKey, RecordKind};

/// Volatile backend, for tests and for hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<RecordKey, Record>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(&RecordKey::new(kind, id.clone())).cloned())
    }

    async fn put(&self, record: &Record) -> StorageResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.remove(&RecordKey::new(kind, id.clone())).is_some())
    }

    async fn scan(&self, kind: RecordKind) -> StorageResult<Vec<Record>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
