//! Scheduler configuration

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max requests admitted to the transport at once
    #[serde(default = "default_max_concurrent", rename = "max-concurrent")]
    pub max_concurrent: usize,

    /// Tokenize response headers into a map instead of keeping raw text
    #[serde(default = "default_true", rename = "parse-headers")]
    pub parse_headers: bool,

    /// Close transport handles once their response is produced
    #[serde(default = "default_true", rename = "auto-close-handles")]
    pub auto_close_handles: bool,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            parse_headers: true,
            auto_close_handles: true,
        }
    }
}

impl SchedulerConfig {
    /// Copy with the concurrency limit clamped to at least 1
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = clamp_concurrency(self.max_concurrent);
        self
    }
}

/// Concurrency below 1 would never admit anything
pub(crate) fn clamp_concurrency(requested: usize) -> usize {
    if requested == 0 {
        warn!("max_concurrent of 0 clamped to 1");
        1
    } else {
        requested
    }
}
