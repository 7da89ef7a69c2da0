use std::collections::HashSet;
use std::path::Path;

use crate::Config;

/// Plan names available when `[[catalog.plans]]` is empty
pub const PREDEFINED_PLANS: [&str; 3] = ["Free", "Pro", "Enterprise"];

const TIERS: [&str; 4] = ["free", "pro", "enterprise", "custom"];

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is out of range or a catalog entry
    /// references an unknown entity
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_server()?;
        self.validate_limits()?;
        self.validate_abuse()?;
        self.validate_analytics()?;
        self.validate_catalog()?;
        Ok(())
    }

    fn validate_server(&self) -> anyhow::Result<()> {
        if self.server.health.enabled && !self.server.health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/'");
        }

        if let Some(ref guard) = self.server.edge_guard
            && (guard.requests == 0 || guard.window.is_zero())
        {
            anyhow::bail!("server.edge_guard requires requests > 0 and a non-zero window");
        }

        Ok(())
    }

    fn validate_limits(&self) -> anyhow::Result<()> {
        if self.gateway.default_upstream_timeout_ms == 0 {
            anyhow::bail!("gateway.default_upstream_timeout_ms must be greater than 0");
        }

        let defaults = &self.gateway.defaults;
        if defaults.rate_limit_rps.is_nan() || defaults.rate_limit_rps <= 0.0 {
            anyhow::bail!("gateway.defaults.rate_limit_rps must be greater than 0");
        }
        if defaults.rate_limit_burst == 0 {
            anyhow::bail!("gateway.defaults.rate_limit_burst must be at least 1");
        }

        if self.gateway.credential_cache_capacity > 1_000_000 {
            anyhow::bail!("gateway.credential_cache_capacity exceeds maximum of 1,000,000");
        }

        Ok(())
    }

    fn validate_abuse(&self) -> anyhow::Result<()> {
        let abuse = &self.abuse;

        if !(abuse.ewma_alpha > 0.0 && abuse.ewma_alpha <= 1.0) {
            anyhow::bail!("abuse.ewma_alpha must be in (0, 1]");
        }
        if abuse.zscore_threshold.is_nan() || abuse.zscore_threshold <= 0.0 {
            anyhow::bail!("abuse.zscore_threshold must be greater than 0");
        }
        if abuse.consecutive_windows == 0 {
            anyhow::bail!("abuse.consecutive_windows must be at least 1");
        }
        if abuse.window.is_zero() {
            anyhow::bail!("abuse.window must be non-zero");
        }
        if !(abuse.max_error_ratio > 0.0 && abuse.max_error_ratio <= 1.0) {
            anyhow::bail!("abuse.max_error_ratio must be in (0, 1]");
        }
        if abuse.bloom_expected_items == 0 {
            anyhow::bail!("abuse.bloom_expected_items must be greater than 0");
        }
        if !(abuse.bloom_false_positive_rate > 0.0 && abuse.bloom_false_positive_rate < 1.0) {
            anyhow::bail!("abuse.bloom_false_positive_rate must be in (0, 1)");
        }

        Ok(())
    }

    fn validate_analytics(&self) -> anyhow::Result<()> {
        if self.analytics.batch_size == 0 || self.analytics.queue_capacity == 0 {
            anyhow::bail!("analytics.batch_size and analytics.queue_capacity must be greater than 0");
        }
        if self.analytics.flush_interval.is_zero() {
            anyhow::bail!("analytics.flush_interval must be non-zero");
        }
        Ok(())
    }

    fn validate_catalog(&self) -> anyhow::Result<()> {
        let catalog = &self.catalog;

        let mut plans = HashSet::new();
        if catalog.plans.is_empty() {
            plans.extend(PREDEFINED_PLANS);
        }
        for plan in &catalog.plans {
            if !TIERS.contains(&plan.tier.as_str()) {
                anyhow::bail!("plan '{}' has unknown tier '{}'", plan.name, plan.tier);
            }
            if plan.rate_limit_rps.is_some_and(|rps| rps.is_nan() || rps <= 0.0) {
                anyhow::bail!("plan '{}' rate_limit_rps must be greater than 0", plan.name);
            }
            if !plans.insert(plan.name.as_str()) {
                anyhow::bail!("duplicate plan '{}'", plan.name);
            }
        }

        let mut tenants = HashSet::new();
        for tenant in &catalog.tenants {
            if let Some(ref plan) = tenant.plan
                && !plans.contains(plan.as_str())
            {
                anyhow::bail!("tenant '{}' references unknown plan '{plan}'", tenant.name);
            }
            if !tenants.insert(tenant.name.as_str()) {
                anyhow::bail!("duplicate tenant '{}'", tenant.name);
            }
        }

        for key in &catalog.keys {
            if !tenants.contains(key.tenant.as_str()) {
                anyhow::bail!("api key '{}' references unknown tenant '{}'", key.name, key.tenant);
            }
            if key.rate_limit_rps.is_some_and(|rps| rps.is_nan() || rps <= 0.0) {
                anyhow::bail!("api key '{}' rate_limit_rps must be greater than 0", key.name);
            }
        }

        let mut patterns = HashSet::new();
        for route in &catalog.routes {
            if !tenants.contains(route.tenant.as_str()) {
                anyhow::bail!("route '{}' references unknown tenant '{}'", route.name, route.tenant);
            }
            if !route.path_prefix.starts_with('/') {
                anyhow::bail!("route '{}' path_prefix must start with '/'", route.name);
            }
            if route.timeout_ms == Some(0) {
                anyhow::bail!("route '{}' timeout_ms must be greater than 0", route.name);
            }

            let mut methods: Vec<String> = route.methods.iter().map(|m| m.to_ascii_uppercase()).collect();
            methods.sort();
            let pattern = (route.tenant.as_str(), route.host.as_deref(), route.path_prefix.as_str(), methods);
            if !patterns.insert(pattern) {
                tracing::warn!(
                    route = %route.name,
                    tenant = %route.tenant,
                    "route duplicates an earlier pattern, the earlier route wins"
                );
            }
        }

        Ok(())
    }
}
