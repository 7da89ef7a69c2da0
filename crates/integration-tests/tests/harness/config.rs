//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use heliox_config::{
    AnalyticsConfig, ApiKeyConfig, CatalogConfig, Config, EdgeGuardConfig, PlanConfig, RouteConfig, ServerConfig,
    TenantConfig,
};
use secrecy::SecretString;

/// Tenant every builder starts with
pub const TENANT: &str = "acme";

/// Secret of the tenant's default key
pub const SECRET: &str = "hlx_integration0000000000000000000000000001";

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// One active tenant on the Free plan with one active key, no routes
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    ..ServerConfig::default()
                },
                analytics: AnalyticsConfig {
                    flush_interval: Duration::from_millis(20),
                    ..AnalyticsConfig::default()
                },
                catalog: CatalogConfig {
                    tenants: vec![TenantConfig {
                        name: TENANT.to_owned(),
                        plan: Some("Free".to_owned()),
                        active: true,
                    }],
                    keys: vec![Self::key("default", SECRET)],
                    ..CatalogConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Active key for the default tenant, limits from its plan
    pub fn key(name: &str, secret: &str) -> ApiKeyConfig {
        ApiKeyConfig {
            tenant: TENANT.to_owned(),
            name: name.to_owned(),
            secret: SecretString::from(secret.to_owned()),
            active: true,
            quota_daily: None,
            quota_monthly: None,
            rate_limit_rps: None,
            rate_limit_burst: None,
        }
    }

    /// Uncached route of the default tenant
    pub fn route(name: &str, path_prefix: &str, upstream: &str) -> RouteConfig {
        RouteConfig {
            tenant: TENANT.to_owned(),
            name: name.to_owned(),
            host: None,
            path_prefix: path_prefix.to_owned(),
            methods: Vec::new(),
            upstream_url: upstream.parse().expect("valid upstream URL"),
            strip_prefix: false,
            timeout_ms: None,
            cache: None,
            active: true,
        }
    }

    /// Custom-tier plan with the given rate limits
    pub fn plan(name: &str, rate_limit_rps: f64, rate_limit_burst: u32) -> PlanConfig {
        PlanConfig {
            name: name.to_owned(),
            tier: "custom".to_owned(),
            quota_daily: Some(0),
            quota_monthly: Some(0),
            rate_limit_rps: Some(rate_limit_rps),
            rate_limit_burst: Some(rate_limit_burst),
            max_api_keys: None,
            max_routes: None,
            cache_enabled: Some(true),
        }
    }

    pub fn with_route(self, name: &str, path_prefix: &str, upstream: &str) -> Self {
        self.with_route_config(Self::route(name, path_prefix, upstream))
    }

    pub fn with_route_config(mut self, route: RouteConfig) -> Self {
        self.config.catalog.routes.push(route);
        self
    }

    pub fn with_key(mut self, key: ApiKeyConfig) -> Self {
        self.config.catalog.keys.push(key);
        self
    }

    /// Replace the default key
    pub fn with_default_key(mut self, key: ApiKeyConfig) -> Self {
        self.config.catalog.keys[0] = key;
        self
    }

    /// Register `plan` and move the default tenant onto it
    ///
    /// Predefined plans are no longer seeded once any plan is configured.
    pub fn with_plan(mut self, plan: PlanConfig) -> Self {
        self.config.catalog.tenants[0].plan = Some(plan.name.clone());
        self.config.catalog.plans.push(plan);
        self
    }

    pub fn with_inactive_tenant(mut self) -> Self {
        self.config.catalog.tenants[0].active = false;
        self
    }

    pub fn with_edge_guard(mut self, requests: u32, window: Duration) -> Self {
        self.config.server.edge_guard = Some(EdgeGuardConfig { requests, window });
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.config.server.max_body_size = bytes;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config.validate().expect("test config is valid");
        self.config
    }
}
