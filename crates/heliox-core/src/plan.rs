use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::ApiKey;

/// Subscription tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
    Custom,
}

/// Immutable limit template referenced by tenants
///
/// Quota limits of `0` mean unlimited, as do `max_api_keys` and `max_routes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub tier: PlanTier,
    pub quota_daily: u64,
    pub quota_monthly: u64,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub max_api_keys: u32,
    pub max_routes: u32,
    pub cache_enabled: bool,
    pub analytics_enabled: bool,
    pub priority_support: bool,
    pub custom_domains: bool,
}

impl Plan {
    /// Entry tier for testing and small projects
    pub fn free() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: "Free".to_string(),
            tier: PlanTier::Free,
            quota_daily: 1_000,
            quota_monthly: 10_000,
            rate_limit_rps: 10.0,
            rate_limit_burst: 20,
            max_api_keys: 2,
            max_routes: 5,
            cache_enabled: true,
            analytics_enabled: false,
            priority_support: false,
            custom_domains: false,
        }
    }

    /// Tier for growing applications
    pub fn pro() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: "Pro".to_string(),
            tier: PlanTier::Pro,
            quota_daily: 50_000,
            quota_monthly: 500_000,
            rate_limit_rps: 100.0,
            rate_limit_burst: 200,
            max_api_keys: 10,
            max_routes: 25,
            cache_enabled: true,
            analytics_enabled: true,
            priority_support: false,
            custom_domains: false,
        }
    }

    /// Unlimited-quota tier for large workloads
    pub fn enterprise() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: "Enterprise".to_string(),
            tier: PlanTier::Enterprise,
            quota_daily: 0,
            quota_monthly: 0,
            rate_limit_rps: 1_000.0,
            rate_limit_burst: 2_000,
            max_api_keys: 0,
            max_routes: 0,
            cache_enabled: true,
            analytics_enabled: true,
            priority_support: true,
            custom_domains: true,
        }
    }

    /// Predefined plan for a tier, `None` for custom
    pub fn predefined(tier: PlanTier) -> Option<Self> {
        match tier {
            PlanTier::Free => Some(Self::free()),
            PlanTier::Pro => Some(Self::pro()),
            PlanTier::Enterprise => Some(Self::enterprise()),
            PlanTier::Custom => None,
        }
    }
}

/// Global fallback limits for tenants without a plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultLimits {
    pub quota_daily: u64,
    pub quota_monthly: u64,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub cache_enabled: bool,
}

impl Default for DefaultLimits {
    fn default() -> Self {
        Self {
            quota_daily: 1_000,
            quota_monthly: 10_000,
            rate_limit_rps: 100.0,
            rate_limit_burst: 200,
            cache_enabled: true,
        }
    }
}

/// Limits that apply to one request's key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub quota_daily: u64,
    pub quota_monthly: u64,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
    pub cache_enabled: bool,
}

impl EffectiveLimits {
    /// Resolve limits for a key
    ///
    /// Key overrides win, then the tenant's plan, then the global defaults.
    /// A non-positive rate falls through to the next layer so the result is
    /// always admissible.
    pub fn resolve(key: &ApiKey, plan: Option<&Plan>, defaults: &DefaultLimits) -> Self {
        let plan_rps = plan.map_or(defaults.rate_limit_rps, |p| p.rate_limit_rps);
        let plan_rps = if plan_rps > 0.0 { plan_rps } else { defaults.rate_limit_rps };
        let plan_burst = plan.map_or(defaults.rate_limit_burst, |p| p.rate_limit_burst);

        Self {
            quota_daily: key
                .quota_daily
                .unwrap_or_else(|| plan.map_or(defaults.quota_daily, |p| p.quota_daily)),
            quota_monthly: key
                .quota_monthly
                .unwrap_or_else(|| plan.map_or(defaults.quota_monthly, |p| p.quota_monthly)),
            rate_limit_rps: key.rate_limit_rps.filter(|rps| *rps > 0.0).unwrap_or(plan_rps),
            rate_limit_burst: key.rate_limit_burst.unwrap_or(plan_burst).max(1),
            cache_enabled: plan.map_or(defaults.cache_enabled, |p| p.cache_enabled),
        }
    }

    /// Limits copied onto a freshly issued key
    pub fn from_plan(plan: Option<&Plan>, defaults: &DefaultLimits) -> Self {
        plan.map_or(
            Self {
                quota_daily: defaults.quota_daily,
                quota_monthly: defaults.quota_monthly,
                rate_limit_rps: defaults.rate_limit_rps,
                rate_limit_burst: defaults.rate_limit_burst,
                cache_enabled: defaults.cache_enabled,
            },
            |p| Self {
                quota_daily: p.quota_daily,
                quota_monthly: p.quota_monthly,
                rate_limit_rps: p.rate_limit_rps,
                rate_limit_burst: p.rate_limit_burst,
                cache_enabled: p.cache_enabled,
            },
        )
    }
}
