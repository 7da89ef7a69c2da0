//! Seeds the in-memory catalog from `[catalog]`

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use heliox_config::{
    CacheDefaults, CatalogConfig, Config, DefaultLimitsConfig, PlanConfig, QueryKeyConfig, RouteCacheConfig,
    RouteConfig,
};
use heliox_core::{
    ApiKey, CachePolicy, DefaultLimits, KeyStatus, MemoryCatalog, Plan, PlanTier, QueryKeyRule, Route, Tenant,
    hash_secret, key_prefix,
};
use jiff::Timestamp;
use secrecy::ExposeSecret;
use uuid::Uuid;

pub fn default_limits(config: &DefaultLimitsConfig) -> DefaultLimits {
    DefaultLimits {
        quota_daily: config.quota_daily,
        quota_monthly: config.quota_monthly,
        rate_limit_rps: config.rate_limit_rps,
        rate_limit_burst: config.rate_limit_burst,
        cache_enabled: config.cache_enabled,
    }
}

/// Build the catalog, assigning ids and resolving references by name
pub fn build_catalog(config: &Config, now: Timestamp) -> anyhow::Result<MemoryCatalog> {
    let defaults = default_limits(&config.gateway.defaults);
    let catalog = MemoryCatalog::new(defaults);
    let seed = &config.catalog;

    let plans = seed_plans(&catalog, seed, &defaults)?;

    let mut tenants = HashMap::new();
    for tenant in &seed.tenants {
        let plan_id = match tenant.plan.as_deref() {
            Some(name) => Some(
                *plans
                    .get(name)
                    .with_context(|| format!("tenant '{}' references unknown plan '{name}'", tenant.name))?,
            ),
            None => None,
        };
        let id = Uuid::now_v7();
        catalog.insert_tenant(Tenant {
            id,
            name: tenant.name.clone(),
            plan_id,
            is_active: tenant.active,
        });
        tenants.insert(tenant.name.as_str(), id);
    }

    let tenant_id = |name: &str, owner: &str| {
        tenants
            .get(name)
            .copied()
            .with_context(|| format!("'{owner}' references unknown tenant '{name}'"))
    };

    for key in &seed.keys {
        let secret = key.secret.expose_secret();
        catalog.insert_key(ApiKey {
            id: Uuid::now_v7(),
            tenant_id: tenant_id(&key.tenant, &key.name)?,
            name: key.name.clone(),
            key_hash: hash_secret(secret),
            key_prefix: key_prefix(secret),
            status: if key.active { KeyStatus::Active } else { KeyStatus::Disabled },
            quota_daily: key.quota_daily,
            quota_monthly: key.quota_monthly,
            rate_limit_rps: key.rate_limit_rps,
            rate_limit_burst: key.rate_limit_burst,
            last_used_at: None,
            created_at: now,
        });
    }

    for route in &seed.routes {
        let route = build_route(route, tenant_id(&route.tenant, &route.name)?, config);
        let name = route.name.clone();
        catalog
            .add_route(route)
            .with_context(|| format!("failed to register route '{name}'"))?;
    }

    tracing::info!(
        plans = plans.len(),
        tenants = seed.tenants.len(),
        keys = seed.keys.len(),
        routes = seed.routes.len(),
        "catalog seeded"
    );

    Ok(catalog)
}

fn seed_plans(
    catalog: &MemoryCatalog,
    seed: &CatalogConfig,
    defaults: &DefaultLimits,
) -> anyhow::Result<HashMap<String, Uuid>> {
    let mut ids = HashMap::new();

    if seed.plans.is_empty() {
        for plan in [Plan::free(), Plan::pro(), Plan::enterprise()] {
            ids.insert(plan.name.clone(), plan.id);
            catalog.insert_plan(plan);
        }
        return Ok(ids);
    }

    for config in &seed.plans {
        let plan = build_plan(config, defaults)?;
        ids.insert(plan.name.clone(), plan.id);
        catalog.insert_plan(plan);
    }
    Ok(ids)
}

/// Plan from its tier template with the configured overrides applied
fn build_plan(config: &PlanConfig, defaults: &DefaultLimits) -> anyhow::Result<Plan> {
    let tier = PlanTier::from_str(&config.tier)
        .map_err(|_| anyhow::anyhow!("plan '{}' has unknown tier '{}'", config.name, config.tier))?;

    let base = Plan::predefined(tier).unwrap_or_else(|| Plan {
        id: Uuid::now_v7(),
        name: String::new(),
        tier,
        quota_daily: defaults.quota_daily,
        quota_monthly: defaults.quota_monthly,
        rate_limit_rps: defaults.rate_limit_rps,
        rate_limit_burst: defaults.rate_limit_burst,
        max_api_keys: 0,
        max_routes: 0,
        cache_enabled: defaults.cache_enabled,
        analytics_enabled: true,
        priority_support: false,
        custom_domains: false,
    });

    Ok(Plan {
        name: config.name.clone(),
        quota_daily: config.quota_daily.unwrap_or(base.quota_daily),
        quota_monthly: config.quota_monthly.unwrap_or(base.quota_monthly),
        rate_limit_rps: config.rate_limit_rps.unwrap_or(base.rate_limit_rps),
        rate_limit_burst: config.rate_limit_burst.unwrap_or(base.rate_limit_burst),
        max_api_keys: config.max_api_keys.unwrap_or(base.max_api_keys),
        max_routes: config.max_routes.unwrap_or(base.max_routes),
        cache_enabled: config.cache_enabled.unwrap_or(base.cache_enabled),
        ..base
    })
}

fn build_route(config: &RouteConfig, tenant_id: Uuid, root: &Config) -> Route {
    let cache_policy = config
        .cache
        .as_ref()
        .map(|cache| cache_policy(cache, &root.cache.defaults, root.gateway.max_cache_body_size));

    Route {
        id: Uuid::now_v7(),
        tenant_id,
        name: config.name.clone(),
        host: config.host.clone(),
        path_prefix: config.path_prefix.clone(),
        methods: config.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
        upstream_url: config.upstream_url.clone(),
        strip_prefix: config.strip_prefix,
        timeout: config.timeout_ms.map(Duration::from_millis),
        cache_policy,
        is_active: config.active,
    }
}

/// Route cache settings layered over `[cache.defaults]`
///
/// The body limit is capped by the gateway-wide maximum.
fn cache_policy(config: &RouteCacheConfig, defaults: &CacheDefaults, max_body_size: usize) -> CachePolicy {
    let query = match &config.query {
        QueryKeyConfig::All => QueryKeyRule::All,
        QueryKeyConfig::Ignore(names) => QueryKeyRule::Ignore(names.clone()),
        QueryKeyConfig::Only(names) => QueryKeyRule::Only(names.clone()),
    };

    CachePolicy {
        ttl: config.ttl.unwrap_or(defaults.ttl),
        stale_window: config.stale_window.unwrap_or(defaults.stale_window),
        methods: config
            .methods
            .as_ref()
            .unwrap_or(&defaults.methods)
            .iter()
            .map(|m| m.to_ascii_uppercase())
            .collect(),
        statuses: config.statuses.clone().unwrap_or_else(|| defaults.statuses.clone()),
        query,
        vary_headers: config.vary_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
        max_body_size: config.max_body_size.map_or(max_body_size, |size| size.min(max_body_size)),
        revalidate: config.revalidate.unwrap_or(defaults.revalidate),
    }
}

#[cfg(test)]
mod tests {
    use heliox_core::{KeyStore, PlanStore, RouteStore, TenantStore};

    use super::*;

    const SEED: &str = r#"
[[catalog.plans]]
name = "Starter"
tier = "free"
rate_limit_rps = 5.0

[[catalog.plans]]
name = "Internal"

[[catalog.tenants]]
name = "acme"
plan = "Starter"

[[catalog.tenants]]
name = "lab"
plan = "Internal"

[[catalog.keys]]
tenant = "acme"
name = "ci"
secret = "hlx_acme_ci_secret"

[[catalog.routes]]
tenant = "acme"
name = "users"
path_prefix = "/users"
methods = ["get"]
upstream_url = "http://users.internal:8080"
timeout_ms = 2500

[catalog.routes.cache]
ttl = "30s"
vary_headers = ["Accept-Language"]
query = { mode = "ignore", names = ["utm_source"] }
max_body_size = 999999999
"#;

    fn now() -> Timestamp {
        Timestamp::from_second(1_700_000_000).unwrap()
    }

    #[tokio::test]
    async fn seeds_entities_and_resolves_names() {
        let config = Config::from_toml(SEED).unwrap();
        let catalog = build_catalog(&config, now()).unwrap();

        let key = catalog.find_by_hash(&hash_secret("hlx_acme_ci_secret")).await.unwrap().unwrap();
        assert_eq!(key.name, "ci");
        assert!(key.is_active());

        let tenant = catalog.get_tenant(key.tenant_id).await.unwrap().unwrap();
        assert_eq!(tenant.name, "acme");

        let plan = catalog.get_plan(tenant.plan_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(plan.name, "Starter");
        assert_eq!(plan.tier, PlanTier::Free);
        assert!((plan.rate_limit_rps - 5.0).abs() < f64::EPSILON);
        assert_eq!(plan.quota_daily, Plan::free().quota_daily);

        let routes = catalog.routes_for_tenant(tenant.id).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].methods, vec!["GET".to_string()]);
        assert_eq!(routes[0].timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn route_cache_layers_over_defaults() {
        let config = Config::from_toml(SEED).unwrap();
        let policy = cache_policy(
            config.catalog.routes[0].cache.as_ref().unwrap(),
            &config.cache.defaults,
            config.gateway.max_cache_body_size,
        );

        assert_eq!(policy.ttl, Duration::from_secs(30));
        assert_eq!(policy.stale_window, config.cache.defaults.stale_window);
        assert_eq!(policy.vary_headers, vec!["accept-language".to_string()]);
        assert_eq!(policy.query, QueryKeyRule::Ignore(vec!["utm_source".to_string()]));
        assert_eq!(policy.max_body_size, config.gateway.max_cache_body_size);
    }

    #[test]
    fn custom_tier_starts_from_global_defaults() {
        let defaults = DefaultLimits::default();
        let config = Config::from_toml(SEED).unwrap();

        let plan = build_plan(&config.catalog.plans[1], &defaults).unwrap();

        assert_eq!(plan.tier, PlanTier::Custom);
        assert_eq!(plan.quota_daily, defaults.quota_daily);
        assert_eq!(plan.max_routes, 0);
    }

    #[test]
    fn empty_plan_list_uses_predefined_plans() {
        let config = Config::from_toml(
            r#"
[[catalog.tenants]]
name = "solo"
plan = "Pro"
"#,
        )
        .unwrap();

        let catalog = build_catalog(&config, now()).unwrap();

        assert_eq!(catalog.defaults(), &default_limits(&config.gateway.defaults));
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let plan = PlanConfig {
            name: "Gold".to_string(),
            tier: "gold".to_string(),
            quota_daily: None,
            quota_monthly: None,
            rate_limit_rps: None,
            rate_limit_burst: None,
            max_api_keys: None,
            max_routes: None,
            cache_enabled: None,
        };

        assert!(build_plan(&plan, &DefaultLimits::default()).is_err());
    }
}
