use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use heliox_core::{DefaultLimits, EffectiveLimits, KeyStore, PlanStore, TenantStore, hash_secret};
use mini_moka::sync::Cache;
use uuid::Uuid;

use crate::AuthError;

/// Who a request belongs to and what limits apply
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredential {
    pub tenant_id: Uuid,
    pub key_id: Uuid,
    /// Key overrides layered over the plan and global defaults
    pub limits: EffectiveLimits,
    /// Plan limits shared by every key of the tenant
    pub tenant_limits: EffectiveLimits,
}

/// Resolves raw keys against the key, tenant and plan stores with caching
///
/// Only active resolutions are cached, keyed by the secret's SHA-256.
/// Callers toggling, rotating or deleting a key should
/// [`invalidate_key`](Self::invalidate_key) it so the change applies before
/// the cache TTL runs out.
#[derive(Clone)]
pub struct CredentialResolver {
    keys: Arc<dyn KeyStore>,
    tenants: Arc<dyn TenantStore>,
    plans: Arc<dyn PlanStore>,
    defaults: DefaultLimits,
    cache: Cache<String, Arc<ResolvedCredential>>,
    /// Cached secret hashes per key id
    hashes: Arc<DashMap<Uuid, Vec<String>>>,
}

impl CredentialResolver {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        tenants: Arc<dyn TenantStore>,
        plans: Arc<dyn PlanStore>,
        defaults: DefaultLimits,
        cache_ttl: Duration,
        cache_capacity: u64,
    ) -> Self {
        let cache = Cache::builder()
            .time_to_live(cache_ttl)
            .max_capacity(cache_capacity)
            .build();

        Self {
            keys,
            tenants,
            plans,
            defaults,
            cache,
            hashes: Arc::new(DashMap::new()),
        }
    }

    pub async fn resolve(&self, raw_key: &str) -> Result<Arc<ResolvedCredential>, AuthError> {
        let key_hash = hash_secret(raw_key);
        if let Some(cached) = self.cache.get(&key_hash) {
            return Ok(cached);
        }

        let key = self.keys.find_by_hash(&key_hash).await?.ok_or(AuthError::InvalidKey)?;
        if !key.is_active() {
            tracing::debug!(key_id = %key.id, "disabled api key presented");
            return Err(AuthError::Disabled);
        }

        let Some(tenant) = self.tenants.get_tenant(key.tenant_id).await? else {
            tracing::warn!(key_id = %key.id, tenant_id = %key.tenant_id, "api key references a missing tenant");
            return Err(AuthError::InvalidKey);
        };
        if !tenant.is_active {
            tracing::debug!(tenant_id = %tenant.id, "disabled tenant presented a key");
            return Err(AuthError::Disabled);
        }

        let plan = match tenant.plan_id {
            Some(plan_id) => {
                let plan = self.plans.get_plan(plan_id).await?;
                if plan.is_none() {
                    tracing::warn!(tenant_id = %tenant.id, %plan_id, "tenant plan missing, using global defaults");
                }
                plan
            }
            None => None,
        };

        let resolved = Arc::new(ResolvedCredential {
            tenant_id: tenant.id,
            key_id: key.id,
            limits: EffectiveLimits::resolve(&key, plan.as_ref(), &self.defaults),
            tenant_limits: EffectiveLimits::from_plan(plan.as_ref(), &self.defaults),
        });
        let mut hashes = self.hashes.entry(key.id).or_default();
        if !hashes.contains(&key_hash) {
            hashes.push(key_hash.clone());
        }
        drop(hashes);
        self.cache.insert(key_hash, Arc::clone(&resolved));

        Ok(resolved)
    }

    /// Drop a cached resolution by secret
    pub fn invalidate(&self, raw_key: &str) {
        self.cache.invalidate(&hash_secret(raw_key));
    }

    /// Drop every cached resolution of a key, whichever secret produced it
    pub fn invalidate_key(&self, key_id: Uuid) {
        if let Some((_, hashes)) = self.hashes.remove(&key_id) {
            for hash in &hashes {
                self.cache.invalidate(hash);
            }
            tracing::debug!(%key_id, entries = hashes.len(), "credential cache invalidated");
        }
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use heliox_core::{KeyStatus, MemoryCatalog, Plan, Tenant};
    use jiff::Timestamp;
    use secrecy::ExposeSecret;

    use super::*;

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        resolver: CredentialResolver,
        tenant_id: Uuid,
    }

    fn fixture(plan: Option<Plan>) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new(DefaultLimits::default()));
        let plan_id = plan.as_ref().map(|p| p.id);
        if let Some(plan) = plan {
            catalog.insert_plan(plan);
        }
        let tenant_id = Uuid::now_v7();
        catalog.insert_tenant(Tenant {
            id: tenant_id,
            name: "acme".into(),
            plan_id,
            is_active: true,
        });
        let resolver = CredentialResolver::new(
            catalog.clone(),
            catalog.clone(),
            catalog.clone(),
            DefaultLimits::default(),
            Duration::from_secs(60),
            100,
        );
        Fixture {
            catalog,
            resolver,
            tenant_id,
        }
    }

    #[tokio::test]
    async fn resolves_key_with_plan_limits() {
        let f = fixture(Some(Plan::free()));
        let issued = f.catalog.issue_key(f.tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();

        let resolved = f.resolver.resolve(issued.secret.expose_secret()).await.unwrap();

        assert_eq!(resolved.tenant_id, f.tenant_id);
        assert_eq!(resolved.key_id, issued.key.id);
        assert_eq!(resolved.limits.quota_daily, 1_000);
        assert_eq!(resolved.tenant_limits.rate_limit_burst, 20);
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let f = fixture(None);

        let err = f.resolver.resolve("hlx_nope").await.unwrap_err();

        assert!(matches!(err, AuthError::InvalidKey));
    }

    #[tokio::test]
    async fn disabling_applies_after_invalidation() {
        let f = fixture(None);
        let issued = f.catalog.issue_key(f.tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();
        let secret = issued.secret.expose_secret();
        f.resolver.resolve(secret).await.unwrap();

        f.catalog.set_key_status(issued.key.id, KeyStatus::Disabled).unwrap();
        assert!(f.resolver.resolve(secret).await.is_ok());

        f.resolver.invalidate(secret);
        assert!(matches!(f.resolver.resolve(secret).await, Err(AuthError::Disabled)));
    }

    #[tokio::test]
    async fn key_invalidation_covers_rotated_secrets() {
        let f = fixture(None);
        let issued = f.catalog.issue_key(f.tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();
        let old = issued.secret.expose_secret();
        f.resolver.resolve(old).await.unwrap();

        let rotated = f.catalog.rotate_key(issued.key.id).unwrap();
        assert!(f.resolver.resolve(old).await.is_ok());
        f.resolver.resolve(rotated.secret.expose_secret()).await.unwrap();

        f.catalog.set_key_status(issued.key.id, KeyStatus::Disabled).unwrap();
        f.resolver.invalidate_key(issued.key.id);

        assert!(matches!(f.resolver.resolve(old).await, Err(AuthError::InvalidKey)));
        assert!(matches!(
            f.resolver.resolve(rotated.secret.expose_secret()).await,
            Err(AuthError::Disabled)
        ));
    }

    #[tokio::test]
    async fn disabled_tenant_looks_like_disabled_key() {
        let f = fixture(None);
        let issued = f.catalog.issue_key(f.tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();
        f.catalog.insert_tenant(Tenant {
            id: f.tenant_id,
            name: "acme".into(),
            plan_id: None,
            is_active: false,
        });

        let err = f.resolver.resolve(issued.secret.expose_secret()).await.unwrap_err();

        assert!(matches!(err, AuthError::Disabled));
    }

    #[tokio::test]
    async fn missing_plan_falls_back_to_defaults() {
        let f = fixture(None);
        f.catalog.insert_tenant(Tenant {
            id: f.tenant_id,
            name: "acme".into(),
            plan_id: Some(Uuid::now_v7()),
            is_active: true,
        });
        let issued = f.catalog.issue_key(f.tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();

        let resolved = f.resolver.resolve(issued.secret.expose_secret()).await.unwrap();

        assert_eq!(resolved.tenant_limits, EffectiveLimits::from_plan(None, &DefaultLimits::default()));
    }
}
