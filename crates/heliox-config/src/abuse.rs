use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Abuse detection and block list
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbuseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Track client IPs in addition to API keys
    #[serde(default = "default_true")]
    pub track_ips: bool,
    /// EWMA smoothing constant in `(0, 1]`
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
    /// Z-score above which a window is anomalous
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,
    /// Anomalous windows in a row before blocking
    #[serde(default = "default_consecutive_windows")]
    pub consecutive_windows: u32,
    /// Length of one evaluation window
    #[serde(default = "default_window", deserialize_with = "crate::duration::deserialize")]
    pub window: Duration,
    /// Closed windows before scoring starts
    #[serde(default = "default_warmup_windows")]
    pub warmup_windows: u32,
    /// Floor for the trailing standard deviation, in requests per second
    #[serde(default = "default_min_stddev")]
    pub min_stddev: f64,
    /// Error-ratio EWMA above which a window is anomalous
    #[serde(default = "default_max_error_ratio")]
    pub max_error_ratio: f64,
    /// Requests needed in a window before the error ratio counts
    #[serde(default = "default_min_error_samples")]
    pub min_error_samples: u64,
    /// How long a block lasts
    #[serde(default = "default_block_duration", deserialize_with = "crate::duration::deserialize")]
    pub block_duration: Duration,
    /// Expected number of blocked identifiers for bloom sizing
    #[serde(default = "default_bloom_expected_items")]
    pub bloom_expected_items: usize,
    /// Target bloom false-positive rate
    #[serde(default = "default_bloom_false_positive_rate")]
    pub bloom_false_positive_rate: f64,
    /// How often the bloom filter is rebuilt from the rule store
    #[serde(default = "default_bloom_refresh", deserialize_with = "crate::duration::deserialize")]
    pub bloom_refresh_interval: Duration,
    /// Webhook receiving block events
    #[serde(default)]
    pub notify_url: Option<Url>,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            track_ips: true,
            ewma_alpha: default_ewma_alpha(),
            zscore_threshold: default_zscore_threshold(),
            consecutive_windows: default_consecutive_windows(),
            window: default_window(),
            warmup_windows: default_warmup_windows(),
            min_stddev: default_min_stddev(),
            max_error_ratio: default_max_error_ratio(),
            min_error_samples: default_min_error_samples(),
            block_duration: default_block_duration(),
            bloom_expected_items: default_bloom_expected_items(),
            bloom_false_positive_rate: default_bloom_false_positive_rate(),
            bloom_refresh_interval: default_bloom_refresh(),
            notify_url: None,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

const fn default_ewma_alpha() -> f64 {
    0.3
}

const fn default_zscore_threshold() -> f64 {
    3.0
}

const fn default_consecutive_windows() -> u32 {
    3
}

const fn default_window() -> Duration {
    Duration::from_secs(10)
}

const fn default_warmup_windows() -> u32 {
    5
}

const fn default_min_stddev() -> f64 {
    1.0
}

const fn default_max_error_ratio() -> f64 {
    0.8
}

const fn default_min_error_samples() -> u64 {
    20
}

const fn default_block_duration() -> Duration {
    Duration::from_secs(300)
}

const fn default_bloom_expected_items() -> usize {
    10_000
}

const fn default_bloom_false_positive_rate() -> f64 {
    0.01
}

const fn default_bloom_refresh() -> Duration {
    Duration::from_secs(30)
}
