//! In-memory arena implementing the collaborator stores
//!
//! Entities reference each other by id only. Keys are indexed by the hash of
//! their secret so the raw secret is never retained after issue.

use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use jiff::Timestamp;
use secrecy::SecretString;
use uuid::Uuid;

use crate::outcome::RequestLog;
use crate::plan::{DefaultLimits, EffectiveLimits, Plan};
use crate::route::Route;
use crate::store::{KeyStore, PlanStore, RequestLogSink, RouteStore, StoreError, TenantStore};
use crate::tenant::{ApiKey, KeyStatus, Tenant, generate_api_key, hash_secret, key_prefix};

/// Key allowance for tenants without a plan
const FALLBACK_MAX_API_KEYS: u32 = 2;

/// Route allowance for tenants without a plan
const FALLBACK_MAX_ROUTES: u32 = 5;

/// Freshly issued or rotated key, the only time the secret is visible
#[derive(Debug)]
pub struct IssuedKey {
    pub key: ApiKey,
    pub secret: SecretString,
}

/// Id-keyed tables for plans, tenants, keys, routes and outcome records
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    defaults: DefaultLimits,
    plans: DashMap<Uuid, Plan>,
    tenants: DashMap<Uuid, Tenant>,
    keys: DashMap<Uuid, ApiKey>,
    key_index: DashMap<String, Uuid>,
    routes: RwLock<Vec<Route>>,
    logs: RwLock<Vec<RequestLog>>,
    /// Serializes count-then-insert mutations
    write_lock: Mutex<()>,
}

impl MemoryCatalog {
    pub fn new(defaults: DefaultLimits) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn defaults(&self) -> &DefaultLimits {
        &self.defaults
    }

    pub fn insert_plan(&self, plan: Plan) {
        self.plans.insert(plan.id, plan);
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id, tenant);
    }

    /// Seed a key whose secret is already known
    pub fn insert_key(&self, key: ApiKey) {
        self.key_index.insert(key.key_hash.clone(), key.id);
        self.keys.insert(key.id, key);
    }

    pub fn key(&self, key_id: Uuid) -> Option<ApiKey> {
        self.keys.get(&key_id).map(|k| k.clone())
    }

    pub fn keys_for_tenant(&self, tenant_id: Uuid) -> Vec<ApiKey> {
        let mut keys: Vec<ApiKey> = self
            .keys
            .iter()
            .filter(|k| k.tenant_id == tenant_id)
            .map(|k| k.clone())
            .collect();
        keys.sort_by_key(|k| k.created_at);
        keys
    }

    fn tenant_plan(&self, tenant_id: Uuid) -> Result<Option<Plan>, StoreError> {
        let tenant = self.tenants.get(&tenant_id).ok_or_else(|| StoreError::NotFound {
            entity: "tenant",
            id: tenant_id.to_string(),
        })?;
        Ok(tenant.plan_id.and_then(|id| self.plans.get(&id).map(|p| p.clone())))
    }

    /// Create a key for a tenant with limits copied from its plan
    pub fn issue_key(&self, tenant_id: Uuid, name: &str, now: Timestamp) -> Result<IssuedKey, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let plan = self.tenant_plan(tenant_id)?;
        let max = plan.as_ref().map_or(FALLBACK_MAX_API_KEYS, |p| p.max_api_keys);
        let current = self.keys.iter().filter(|k| k.tenant_id == tenant_id).count();
        if max > 0 && current >= max as usize {
            return Err(StoreError::LimitReached {
                entity: "api keys",
                max,
            });
        }

        let limits = EffectiveLimits::from_plan(plan.as_ref(), &self.defaults);
        let secret = generate_api_key();
        let key = ApiKey {
            id: Uuid::now_v7(),
            tenant_id,
            name: name.to_string(),
            key_hash: hash_secret(&secret),
            key_prefix: key_prefix(&secret),
            status: KeyStatus::Active,
            quota_daily: Some(limits.quota_daily),
            quota_monthly: Some(limits.quota_monthly),
            rate_limit_rps: Some(limits.rate_limit_rps),
            rate_limit_burst: Some(limits.rate_limit_burst),
            last_used_at: None,
            created_at: now,
        };

        self.insert_key(key.clone());
        tracing::debug!(key_id = %key.id, %tenant_id, "issued api key");

        Ok(IssuedKey {
            key,
            secret: SecretString::from(secret),
        })
    }

    /// Replace a key's secret, keeping its id and limits
    pub fn rotate_key(&self, key_id: Uuid) -> Result<IssuedKey, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut entry = self.keys.get_mut(&key_id).ok_or_else(|| not_found_key(key_id))?;
        let secret = generate_api_key();

        self.key_index.remove(&entry.key_hash);
        entry.key_hash = hash_secret(&secret);
        entry.key_prefix = key_prefix(&secret);
        self.key_index.insert(entry.key_hash.clone(), key_id);

        Ok(IssuedKey {
            key: entry.clone(),
            secret: SecretString::from(secret),
        })
    }

    /// Enable or disable a key
    pub fn set_key_status(&self, key_id: Uuid, status: KeyStatus) -> Result<ApiKey, StoreError> {
        let mut entry = self.keys.get_mut(&key_id).ok_or_else(|| not_found_key(key_id))?;
        entry.status = status;
        Ok(entry.clone())
    }

    pub fn delete_key(&self, key_id: Uuid) -> Result<ApiKey, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let (_, key) = self.keys.remove(&key_id).ok_or_else(|| not_found_key(key_id))?;
        self.key_index.remove(&key.key_hash);
        Ok(key)
    }

    /// Register a route, enforcing the tenant plan's route allowance
    pub fn add_route(&self, route: Route) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let plan = self.tenant_plan(route.tenant_id)?;
        let max = plan.as_ref().map_or(FALLBACK_MAX_ROUTES, |p| p.max_routes);

        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let current = routes.iter().filter(|r| r.tenant_id == route.tenant_id).count();
        if max > 0 && current >= max as usize {
            return Err(StoreError::LimitReached { entity: "routes", max });
        }

        routes.push(route);
        Ok(())
    }

    /// Outcome records appended so far, oldest first
    pub fn request_logs(&self) -> Vec<RequestLog> {
        self.logs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Outcome records for one key
    pub fn request_logs_for_key(&self, key_id: Uuid) -> Vec<RequestLog> {
        self.logs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.key_id == Some(key_id))
            .cloned()
            .collect()
    }
}

fn not_found_key(key_id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "api key",
        id: key_id.to_string(),
    }
}

#[async_trait]
impl KeyStore for MemoryCatalog {
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError> {
        let Some(id) = self.key_index.get(key_hash).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.key(id))
    }

    async fn touch_last_used(&self, key_id: Uuid, at: Timestamp) -> Result<(), StoreError> {
        if let Some(mut key) = self.keys.get_mut(&key_id)
            && key.last_used_at.is_none_or(|prev| prev < at)
        {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for MemoryCatalog {
    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.get(&id).map(|t| t.clone()))
    }
}

#[async_trait]
impl PlanStore for MemoryCatalog {
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        Ok(self.plans.get(&id).map(|p| p.clone()))
    }
}

#[async_trait]
impl RouteStore for MemoryCatalog {
    async fn routes_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Route>, StoreError> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        Ok(routes.iter().filter(|r| r.tenant_id == tenant_id).cloned().collect())
    }
}

#[async_trait]
impl RequestLogSink for MemoryCatalog {
    async fn append(&self, records: &[RequestLog]) -> Result<(), StoreError> {
        self.logs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(records);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use url::Url;

    use super::*;

    fn catalog_with_tenant(plan: Option<Plan>) -> (MemoryCatalog, Uuid) {
        let catalog = MemoryCatalog::new(DefaultLimits::default());
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
        (catalog, tenant_id)
    }

    fn route(tenant_id: Uuid, prefix: &str) -> Route {
        Route {
            id: Uuid::now_v7(),
            tenant_id,
            name: prefix.into(),
            host: None,
            path_prefix: prefix.into(),
            methods: Vec::new(),
            upstream_url: Url::parse("http://127.0.0.1:9000").unwrap(),
            strip_prefix: false,
            timeout: None,
            cache_policy: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn issued_key_is_found_by_secret_hash() {
        let (catalog, tenant_id) = catalog_with_tenant(Some(Plan::pro()));

        let issued = catalog.issue_key(tenant_id, "ci", Timestamp::UNIX_EPOCH).unwrap();
        let secret = issued.secret.expose_secret();

        let found = catalog.find_by_hash(&hash_secret(secret)).await.unwrap().unwrap();
        assert_eq!(found.id, issued.key.id);
        assert_eq!(found.key_prefix, &secret[..10]);
        assert_eq!(found.quota_daily, Some(50_000));
    }

    #[test]
    fn plan_edits_do_not_rewrite_issued_keys() {
        let plan = Plan::free();
        let plan_id = plan.id;
        let (catalog, tenant_id) = catalog_with_tenant(Some(plan));

        let issued = catalog.issue_key(tenant_id, "a", Timestamp::UNIX_EPOCH).unwrap();
        if let Some(mut plan) = catalog.plans.get_mut(&plan_id) {
            plan.quota_daily = 1;
        }

        assert_eq!(catalog.key(issued.key.id).unwrap().quota_daily, Some(1_000));
    }

    #[test]
    fn max_api_keys_is_enforced() {
        let (catalog, tenant_id) = catalog_with_tenant(Some(Plan::free()));

        catalog.issue_key(tenant_id, "a", Timestamp::UNIX_EPOCH).unwrap();
        catalog.issue_key(tenant_id, "b", Timestamp::UNIX_EPOCH).unwrap();
        let err = catalog.issue_key(tenant_id, "c", Timestamp::UNIX_EPOCH).unwrap_err();

        assert!(matches!(err, StoreError::LimitReached { max: 2, .. }));
    }

    #[test]
    fn unlimited_plan_allows_many_routes() {
        let (catalog, tenant_id) = catalog_with_tenant(Some(Plan::enterprise()));

        for i in 0..30 {
            catalog.add_route(route(tenant_id, &format!("/r{i}"))).unwrap();
        }
    }

    #[test]
    fn max_routes_is_enforced_without_plan() {
        let (catalog, tenant_id) = catalog_with_tenant(None);

        for i in 0..FALLBACK_MAX_ROUTES {
            catalog.add_route(route(tenant_id, &format!("/r{i}"))).unwrap();
        }

        assert!(catalog.add_route(route(tenant_id, "/extra")).is_err());
    }

    #[tokio::test]
    async fn rotation_invalidates_old_secret() {
        let (catalog, tenant_id) = catalog_with_tenant(None);
        let issued = catalog.issue_key(tenant_id, "a", Timestamp::UNIX_EPOCH).unwrap();
        let old_hash = issued.key.key_hash.clone();

        let rotated = catalog.rotate_key(issued.key.id).unwrap();

        assert!(catalog.find_by_hash(&old_hash).await.unwrap().is_none());
        assert_eq!(
            catalog
                .find_by_hash(&hash_secret(rotated.secret.expose_secret()))
                .await
                .unwrap()
                .unwrap()
                .id,
            issued.key.id
        );
    }

    #[tokio::test]
    async fn toggle_and_delete() {
        let (catalog, tenant_id) = catalog_with_tenant(None);
        let issued = catalog.issue_key(tenant_id, "a", Timestamp::UNIX_EPOCH).unwrap();

        let key = catalog.set_key_status(issued.key.id, KeyStatus::Disabled).unwrap();
        assert!(!key.is_active());

        catalog.delete_key(issued.key.id).unwrap();
        assert!(catalog.find_by_hash(&issued.key.key_hash).await.unwrap().is_none());
        assert!(catalog.delete_key(issued.key.id).is_err());
    }

    #[tokio::test]
    async fn touch_last_used_only_moves_forward() {
        let (catalog, tenant_id) = catalog_with_tenant(None);
        let issued = catalog.issue_key(tenant_id, "a", Timestamp::UNIX_EPOCH).unwrap();
        let later = Timestamp::from_second(100).unwrap();

        catalog.touch_last_used(issued.key.id, later).await.unwrap();
        catalog
            .touch_last_used(issued.key.id, Timestamp::from_second(50).unwrap())
            .await
            .unwrap();

        assert_eq!(catalog.key(issued.key.id).unwrap().last_used_at, Some(later));
    }
}
