//! Remote metadata provider abstraction.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reference-data type as downloaded from the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBatch {
    pub type_name: String,
    /// Remote version of the type. When absent the content hash is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub records: Vec<serde_json::Value>,
}

/// Source of reference data (rules, stages, option sets, ...).
///
/// Transport, authentication and retry policy are the implementation's
/// concern; the manager never retries on its own.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Types whose remote version differs from `local` (type name to
    /// fingerprint), in the order they should be synced.
    async fn list_changed_types(&self, local: &BTreeMap<String, String>) -> SyncResult<Vec<String>>;

    /// Downloads one type.
    async fn fetch_type(&self, type_name: &str) -> SyncResult<ReferenceBatch>;
}

/// In-memory provider for tests.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::collections::BTreeSet;
    use std::sync::{Mutex, PoisonError};

    #[derive(Debug, Clone)]
    struct RemoteType {
        fingerprint: String,
        records: Vec<serde_json::Value>,
    }

    #[derive(Debug, Default)]
    struct MockState {
        types: BTreeMap<String, RemoteType>,
        failing: BTreeSet<String>,
        listing_error: Option<String>,
        calls: Vec<String>,
    }

    /// A provider serving fixed types. Types are listed in name order.
    #[derive(Debug, Default)]
    pub struct MockProvider {
        state: Mutex<MockState>,
    }

    impl MockProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Adds or replaces a remote type.
        #[must_use]
        pub fn with_type(
            self,
            type_name: impl Into<String>,
            fingerprint: impl Into<String>,
            records: Vec<serde_json::Value>,
        ) -> Self {
            self.set_type(type_name, fingerprint, records);
            self
        }

        pub fn set_type(
            &self,
            type_name: impl Into<String>,
            fingerprint: impl Into<String>,
            records: Vec<serde_json::Value>,
        ) {
            self.state().types.insert(
                type_name.into(),
                RemoteType {
                    fingerprint: fingerprint.into(),
                    records,
                },
            );
        }

        /// Makes `fetch_type` fail for one type.
        pub fn fail_type(&self, type_name: impl Into<String>) {
            self.state().failing.insert(type_name.into());
        }

        pub fn heal_type(&self, type_name: &str) {
            self.state().failing.remove(type_name);
        }

        /// Makes `list_changed_types` fail.
        pub fn fail_listing(&self, message: impl Into<String>) {
            self.state().listing_error = Some(message.into());
        }

        /// Calls received so far: `list` or `fetch:<type>`.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.state().calls.clone()
        }
    }

    #[async_trait]
    impl MetadataProvider for MockProvider {
        async fn list_changed_types(
            &self,
            local: &BTreeMap<String, String>,
        ) -> SyncResult<Vec<String>> {
            let mut state = self.state();
            state.calls.push("list".to_string());
            if let Some(message) = &state.listing_error {
                return Err(SyncError::Remote(message.clone()));
            }
            Ok(state
                .types
                .iter()
                .filter(|(name, remote)| local.get(*name) != Some(&remote.fingerprint))
                .map(|(name, _)| name.clone())
                .collect())
        }

        async fn fetch_type(&self, type_name: &str) -> SyncResult<ReferenceBatch> {
            let mut state = self.state();
            state.calls.push(format!("fetch:{type_name}"));
            if state.failing.contains(type_name) {
                return Err(SyncError::Remote(format!("fetch of {type_name} failed")));
            }
            let remote = state
                .types
                .get(type_name)
                .cloned()
                .ok_or_else(|| SyncError::Remote(format!("unknown type {type_name}")))?;
            Ok(ReferenceBatch {
                type_name: type_name.to_string(),
                fingerprint: Some(remote.fingerprint),
                records: remote.records,
            })
        }
    }
}
