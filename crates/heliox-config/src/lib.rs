#![allow(clippy::must_use_candidate)]

pub mod abuse;
pub mod analytics;
pub mod cache;
pub mod catalog;
mod duration;
mod env;
pub mod gateway;
mod loader;
pub mod rate_limit;
pub mod server;
pub mod storage;
pub mod telemetry;

use serde::Deserialize;

pub use abuse::*;
pub use analytics::*;
pub use cache::*;
pub use catalog::*;
pub use gateway::*;
pub use loader::PREDEFINED_PLANS;
pub use rate_limit::*;
pub use server::*;
pub use storage::*;
pub use telemetry::*;

/// Top-level Heliox configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener, health and edge settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream and default-limit settings
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Shared state backend for counters, cache and block rules
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Anomaly detection and blocking
    #[serde(default)]
    pub abuse: AbuseConfig,
    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Outcome recording
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Plans, tenants, keys and routes seeded at startup
    #[serde(default)]
    pub catalog: CatalogConfig,
}
