//! SQLite-backed record storage.
//!
//! One row per `(kind, id)` holding the record's JSON document. Queries run
//! on the blocking pool so the event loop only waits for the round trip.

use crate::backend::StoreBackend;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use visitflow_types::{Record, RecordId, RecordKind};

/// Persistent backend over a single SQLite file.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (or creates) a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                version INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&conn)
        })
        .await?
    }
}

fn decode(body: &str) -> StorageResult<Record> {
    Ok(Record::from_json(body)?)
}

#[async_trait]
impl StoreBackend for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, kind: RecordKind, id: &RecordId) -> StorageResult<Option<Record>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM records WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            body.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn put(&self, record: &Record) -> StorageResult<()> {
        let body = record.to_json()?;
        let kind = record.kind();
        let id = record.id().to_string();
        let version = i64::try_from(record.version())
            .map_err(|_| StorageError::InvalidData(format!("version overflow for {id}")))?;
        let last_modified = record.last_modified().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO records (kind, id, body, version, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![kind.as_str(), id, body, version, last_modified],
            )?;
            debug!("sqlite: wrote {}/{} v{}", kind, id, version);
            Ok(())
        })
        .await
    }

    async fn delete(&self, kind: RecordKind, id: &RecordId) -> StorageResult<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn scan(&self, kind: RecordKind) -> StorageResult<Vec<Record>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT body FROM records WHERE kind = ?1 ORDER BY id")?;
            let bodies = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;
            let mut records = Vec::new();
            for body in bodies {
                records.push(decode(&body?)?);
            }
            Ok(records)
        })
        .await
    }
}
