//! Local record storage for visitflow.
//!
//! Visit and subject records are stored as whole JSON documents keyed by
//! `(kind, id)`. Two backends are provided:
//!
//! - [`SqliteBackend`] persists to a single SQLite file
//! - [`MemoryBackend`] keeps everything in process, for tests
//!
//! # Live queries
//!
//! [`RecordStore`] wraps a backend with change notification. Callers obtain a
//! [`LiveQuery`] for a single record or a filtered collection; the query
//! starts out loading, and after every committed write that could affect it
//! the store republishes its result. Dropping the query releases the
//! subscription.

mod backend;
mod error;
mod live;
mod memory;
mod sqlite;
mod store;

pub use backend::StoreBackend;
pub use error::{StorageError, StorageResult};
pub use live::{LiveQuery, QueryFingerprint};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::RecordStore;
