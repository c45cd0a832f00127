//! Local reference-data storage.
//!
//! Holds the records of every synced reference-data type, the fingerprint
//! each type was synced at, and the time of the last successful full sync.
//! Applying a type replaces its records wholesale.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use visitflow_types::Timestamp;

/// SHA-256 over the JSON encoding of a type's records.
pub fn content_fingerprint(records: &[serde_json::Value]) -> SyncResult<String> {
    let encoded = serde_json::to_vec(records)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Fingerprint of every stored type.
    async fn versions(&self) -> SyncResult<BTreeMap<String, String>>;

    /// Replaces a type's records and records its fingerprint, atomically.
    async fn apply(
        &self,
        type_name: &str,
        fingerprint: &str,
        records: &[serde_json::Value],
    ) -> SyncResult<()>;

    /// Records of one type, in the order they were applied.
    async fn records(&self, type_name: &str) -> SyncResult<Vec<serde_json::Value>>;

    async fn last_sync(&self) -> SyncResult<Option<Timestamp>>;

    async fn set_last_sync(&self, at: Timestamp) -> SyncResult<()>;
}

// ── In-memory ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    versions: BTreeMap<String, String>,
    records: BTreeMap<String, Vec<serde_json::Value>>,
    last_sync: Option<Timestamp>,
}

/// Volatile reference store for tests.
#[derive(Debug, Default)]
pub struct MemoryReferenceStore {
    state: Mutex<MemoryState>,
}

impl MemoryReferenceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn versions(&self) -> SyncResult<BTreeMap<String, String>> {
        Ok(self.state().versions.clone())
    }

    async fn apply(
        &self,
        type_name: &str,
        fingerprint: &str,
        records: &[serde_json::Value],
    ) -> SyncResult<()> {
        let mut state = self.state();
        state
            .versions
            .insert(type_name.to_string(), fingerprint.to_string());
        state.records.insert(type_name.to_string(), records.to_vec());
        Ok(())
    }

    async fn records(&self, type_name: &str) -> SyncResult<Vec<serde_json::Value>> {
        Ok(self
            .state()
            .records
            .get(type_name)
            .cloned()
            .unwrap_or_default())
    }

    async fn last_sync(&self) -> SyncResult<Option<Timestamp>> {
        Ok(self.state().last_sync)
    }

    async fn set_last_sync(&self, at: Timestamp) -> SyncResult<()> {
        self.state().last_sync = Some(at);
        Ok(())
    }
}

// ── SQLite ───────────────────────────────────────────────────────

const LAST_SYNC_KEY: &str = "last_sync";

/// Persistent reference store backed by SQLite.
///
/// Uses its own file so reference data is isolated from visit records.
pub struct SqliteReferenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReferenceStore {
    /// Opens (or creates) a reference store at the given path.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SyncError::Storage(format!("failed to open reference store: {e}")))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory reference store (for testing).
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SyncError::Storage(format!("failed to open in-memory reference store: {e}"))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> SyncResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS reference_types (
                type_name TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reference_records (
                type_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (type_name, position)
            );

            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| SyncError::Storage(format!("failed to init reference schema: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> SyncResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn versions(&self) -> SyncResult<BTreeMap<String, String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT type_name, fingerprint FROM reference_types")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut versions = BTreeMap::new();
            for row in rows {
                let (type_name, fingerprint) = row?;
                versions.insert(type_name, fingerprint);
            }
            Ok(versions)
        })
        .await
    }

    async fn apply(
        &self,
        type_name: &str,
        fingerprint: &str,
        records: &[serde_json::Value],
    ) -> SyncResult<()> {
        let type_name = type_name.to_string();
        let fingerprint = fingerprint.to_string();
        let bodies = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM reference_records WHERE type_name = ?1",
                params![type_name],
            )?;
            for (position, body) in bodies.iter().enumerate() {
                let position = i64::try_from(position)
                    .map_err(|_| SyncError::Storage("too many reference records".into()))?;
                tx.execute(
                    "INSERT INTO reference_records (type_name, position, body) VALUES (?1, ?2, ?3)",
                    params![type_name, position, body],
                )?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO reference_types (type_name, fingerprint) VALUES (?1, ?2)",
                params![type_name, fingerprint],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn records(&self, type_name: &str) -> SyncResult<Vec<serde_json::Value>> {
        let type_name = type_name.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM reference_records WHERE type_name = ?1 ORDER BY position",
            )?;
            let bodies = stmt.query_map(params![type_name], |row| row.get::<_, String>(0))?;
            let mut records = Vec::new();
            for body in bodies {
                records.push(serde_json::from_str(&body?)?);
            }
            Ok(records)
        })
        .await
    }

    async fn last_sync(&self) -> SyncResult<Option<Timestamp>> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row(
                    "SELECT value FROM sync_meta WHERE key = ?1",
                    params![LAST_SYNC_KEY],
                    |row| row.get(0),
                )
                .optional()?;
            value
                .map(|v| {
                    DateTime::parse_from_rfc3339(&v)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| SyncError::Storage(format!("invalid last sync time {v}: {e}")))
                })
                .transpose()
        })
        .await
    }

    async fn set_last_sync(&self, at: Timestamp) -> SyncResult<()> {
        let value = at.to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?1, ?2)",
                params![LAST_SYNC_KEY, value],
            )?;
            Ok(())
        })
        .await
    }
}
