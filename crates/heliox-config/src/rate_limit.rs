use serde::Deserialize;

/// Token-bucket rate limiting
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Also enforce one bucket per tenant across all of its keys
    #[serde(default)]
    pub per_tenant: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_tenant: false,
        }
    }
}

/// Daily and monthly quota accounting
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn enabled() -> bool {
    true
}
