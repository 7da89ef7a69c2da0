use std::time::Duration;

use serde::Deserialize;

/// Upstream forwarding and fallback limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Upstream timeout for routes without their own
    #[serde(default = "default_upstream_timeout_ms")]
    pub default_upstream_timeout_ms: u64,
    /// Responses larger than this are never cached
    #[serde(default = "default_max_cache_body_size")]
    pub max_cache_body_size: usize,
    /// Limits for tenants without a plan
    #[serde(default)]
    pub defaults: DefaultLimitsConfig,
    /// How long a resolved credential is reused
    #[serde(default = "default_credential_cache_ttl", deserialize_with = "crate::duration::deserialize")]
    pub credential_cache_ttl: Duration,
    /// Maximum resolved credentials kept
    #[serde(default = "default_credential_cache_capacity")]
    pub credential_cache_capacity: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_upstream_timeout_ms: default_upstream_timeout_ms(),
            max_cache_body_size: default_max_cache_body_size(),
            defaults: DefaultLimitsConfig::default(),
            credential_cache_ttl: default_credential_cache_ttl(),
            credential_cache_capacity: default_credential_cache_capacity(),
        }
    }
}

impl GatewayConfig {
    pub const fn default_upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.default_upstream_timeout_ms)
    }
}

/// Global fallback limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultLimitsConfig {
    /// Requests per UTC day, `0` for unlimited
    #[serde(default = "default_quota_daily")]
    pub quota_daily: u64,
    /// Requests per UTC month, `0` for unlimited
    #[serde(default = "default_quota_monthly")]
    pub quota_monthly: u64,
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

impl Default for DefaultLimitsConfig {
    fn default() -> Self {
        Self {
            quota_daily: default_quota_daily(),
            quota_monthly: default_quota_monthly(),
            rate_limit_rps: default_rate_limit_rps(),
            rate_limit_burst: default_rate_limit_burst(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

const fn default_upstream_timeout_ms() -> u64 {
    30_000
}

const fn default_max_cache_body_size() -> usize {
    10 * 1024 * 1024
}

const fn default_credential_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

const fn default_credential_cache_capacity() -> u64 {
    10_000
}

const fn default_quota_daily() -> u64 {
    1_000
}

const fn default_quota_monthly() -> u64 {
    10_000
}

const fn default_rate_limit_rps() -> f64 {
    100.0
}

const fn default_rate_limit_burst() -> u32 {
    200
}

const fn default_cache_enabled() -> bool {
    true
}
