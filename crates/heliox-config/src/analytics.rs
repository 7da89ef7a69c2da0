use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Outcome recording configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Records per flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush at least this often
    #[serde(default = "default_flush_interval", deserialize_with = "crate::duration::deserialize")]
    pub flush_interval: Duration,
    /// Bound on records waiting for the recorder
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// POST batches here instead of keeping them in memory
    #[serde(default)]
    pub endpoint: Option<Url>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
            queue_capacity: default_queue_capacity(),
            endpoint: None,
        }
    }
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_queue_capacity() -> usize {
    10_000
}
