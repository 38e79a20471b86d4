//! Editor configuration.

use crate::undo_stack::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Maximum undo levels (0 = unlimited)
    pub history_limit: usize,

    /// Per-write timeout; no timeout when unset
    pub write_timeout_ms: Option<u64>,

    /// Seed for temporary node ids
    pub temp_id_seed: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            write_timeout_ms: None,
            temp_id_seed: "local".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
