//! Interfaces to the collaborators that own configuration entities

use async_trait::async_trait;
use jiff::Timestamp;
use uuid::Uuid;

use crate::outcome::RequestLog;
use crate::plan::Plan;
use crate::route::Route;
use crate::tenant::{ApiKey, Tenant};

/// Failure reaching a collaborator store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("plan limit reached: at most {max} {entity} allowed")]
    LimitReached { entity: &'static str, max: u32 },
}

/// API key lookup
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Find a key by the SHA-256 hex of its secret
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, StoreError>;

    /// Record the latest use of a key
    async fn touch_last_used(&self, key_id: Uuid, at: Timestamp) -> Result<(), StoreError>;
}

/// Tenant lookup
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError>;
}

/// Plan lookup
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;
}

/// Route table lookup
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Routes owned by a tenant, in registration order
    async fn routes_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Route>, StoreError>;
}

/// Append-only destination for request outcomes
#[async_trait]
pub trait RequestLogSink: Send + Sync {
    async fn append(&self, records: &[RequestLog]) -> Result<(), StoreError>;
}
