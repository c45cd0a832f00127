//! Reference-data sync for visitflow.
//!
//! Keeps the local copy of the program's reference data (rules, stages,
//! option sets) fresh. The [`MetadataSyncManager`] is a single per-process
//! state machine:
//!
//! ```text
//! idle ──check──▶ checking ──▶ success | error
//!   │
//!   └──sync───▶ syncing ──(per type)──▶ success | error
//! ```
//!
//! ## Components
//!
//! - **Provider**: the remote source of reference data ([`MetadataProvider`])
//! - **Reference store**: local per-type records, fingerprints and the last
//!   sync time ([`ReferenceStore`])
//! - **State**: the broadcast [`MetadataSyncState`]
//! - **Manager**: orchestrates checks and full syncs
//!
//! Full syncs apply types sequentially. When a type fails, the types before
//! it stay applied and the rest are not attempted.

mod error;
mod manager;
pub mod provider;
mod reference_store;
mod state;

pub use error::{SyncError, SyncPhase, SyncResult};
pub use manager::{
    ListenerId, MetadataSyncConfig, MetadataSyncManager, ProgressCallback, SyncReport,
};
pub use provider::{MetadataProvider, ReferenceBatch};
pub use reference_store::{
    content_fingerprint, MemoryReferenceStore, ReferenceStore, SqliteReferenceStore,
};
pub use state::{MetadataSyncState, MetadataSyncStatus, SyncProgress};
