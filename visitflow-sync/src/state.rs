//! Metadata sync state.
//!
//! One [`MetadataSyncState`] exists per process. It is only mutated by the
//! manager, always as a whole-state transition, and broadcast as copies.

use serde::{Deserialize, Serialize};
use visitflow_types::Timestamp;

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSyncStatus {
    #[default]
    Idle,
    Checking,
    Syncing,
    Success,
    Error,
}

impl MetadataSyncStatus {
    /// Whether an operation is in flight.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Checking | Self::Syncing)
    }
}

/// Progress of a full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
    /// Type processed last (empty before the first).
    pub current: String,
    /// 0 to 100. An empty sync is complete.
    pub percentage: u8,
}

impl SyncProgress {
    #[must_use]
    pub fn new(completed: usize, total: usize, current: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            u8::try_from(completed.min(total) * 100 / total).unwrap_or(100)
        };
        Self {
            completed,
            total,
            current: current.into(),
            percentage,
        }
    }
}

/// Broadcast state of the metadata sync manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSyncState {
    pub status: MetadataSyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<SyncProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Types the remote reported as changed by the last check or sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_types: Option<Vec<String>>,
    /// Types applied by the current or last full sync.
    #[serde(default)]
    pub completed_types: Vec<String>,
}
