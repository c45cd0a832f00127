//! Engine configuration.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use visitflow_sync::MetadataSyncConfig;

/// Default debounce window for field writes and rule re-evaluation.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Configuration for the batched writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Quiet period after the last `update_field` before a flush (ms).
    pub debounce_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl WriterConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Configuration for the rule trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTriggerConfig {
    /// Quiet period after the last `trigger_auto_execute` before evaluating (ms).
    pub debounce_ms: u64,
    /// Write assignments into the live form.
    pub apply_assignments_to_form: bool,
    /// Persist assignments through the batched writer.
    pub persist_assignments: bool,
    /// Clear the value of a field when it goes from visible to hidden.
    pub clear_hidden_fields: bool,
}

impl Default for RuleTriggerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            apply_assignments_to_form: true,
            persist_assignments: true,
            clear_hidden_fields: true,
        }
    }
}

impl RuleTriggerConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub writer: WriterConfig,
    pub rules: RuleTriggerConfig,
    pub metadata: MetadataSyncConfig,
}

impl EngineConfig {
    /// Parses a JSON document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
