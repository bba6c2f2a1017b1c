//! Configuration for the writer coordinator and the rebuild orchestrator

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Writer coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdaterConfig {
    /// Seconds between two drain cycles
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,

    /// Repairs attempted for one batch before giving up
    #[validate(range(min = 1))]
    pub max_repair_attempts: u32,
}

impl UpdaterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            max_repair_attempts: 3,
        }
    }
}

/// Rebuild orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RebuildConfig {
    /// Queue depth above which enumeration pauses
    #[validate(range(min = 1))]
    pub max_queue_size: usize,

    /// Pause between two queue depth checks, in milliseconds
    #[validate(range(min = 1))]
    pub retry_interval_ms: u64,

    /// Rebuild everything when the primary index is created at startup
    pub rebuild_on_empty_index: bool,
}

impl RebuildConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            retry_interval_ms: 30_000,
            rebuild_on_empty_index: true,
        }
    }
}
