//! Seed data for the in-memory catalog
//!
//! Entities reference each other by name here; ids are assigned at startup.

use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Plans, predefined free/pro/enterprise plans are used when empty
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
    #[serde(default)]
    pub keys: Vec<ApiKeyConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Plan template, unset limits come from the predefined plan of `tier`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub name: String,
    /// One of `free`, `pro`, `enterprise`, `custom`
    #[serde(default = "default_tier")]
    pub tier: String,
    pub quota_daily: Option<u64>,
    pub quota_monthly: Option<u64>,
    pub rate_limit_rps: Option<f64>,
    pub rate_limit_burst: Option<u32>,
    pub max_api_keys: Option<u32>,
    pub max_routes: Option<u32>,
    pub cache_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    pub name: String,
    /// Plan name, global defaults apply when unset
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Pre-shared API key
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    /// Owning tenant name
    pub tenant: String,
    pub name: String,
    /// Raw secret, usually `{{ env.VAR }}`
    pub secret: SecretString,
    #[serde(default = "default_true")]
    pub active: bool,
    pub quota_daily: Option<u64>,
    pub quota_monthly: Option<u64>,
    pub rate_limit_rps: Option<f64>,
    pub rate_limit_burst: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Owning tenant name
    pub tenant: String,
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    pub path_prefix: String,
    /// Allowed methods, any when empty
    #[serde(default)]
    pub methods: Vec<String>,
    pub upstream_url: Url,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Response caching for this route, disabled when absent
    #[serde(default)]
    pub cache: Option<RouteCacheConfig>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Per-route cache policy, unset values come from `[cache.defaults]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteCacheConfig {
    #[serde(default, deserialize_with = "crate::duration::deserialize_option")]
    pub ttl: Option<Duration>,
    #[serde(default, deserialize_with = "crate::duration::deserialize_option")]
    pub stale_window: Option<Duration>,
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    #[serde(default)]
    pub statuses: Option<Vec<u16>>,
    /// Query parameters in the cache key
    #[serde(default)]
    pub query: QueryKeyConfig,
    /// Request headers in the cache key
    #[serde(default)]
    pub vary_headers: Vec<String>,
    #[serde(default)]
    pub max_body_size: Option<usize>,
    #[serde(default)]
    pub revalidate: Option<bool>,
}

/// Query parameter selection for cache keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", content = "names", rename_all = "snake_case")]
pub enum QueryKeyConfig {
    #[default]
    All,
    Ignore(Vec<String>),
    Only(Vec<String>),
}

fn default_tier() -> String {
    "custom".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
