//! Shared domain model for the Heliox gateway
//!
//! Holds the entities the admission pipeline reads (plans, tenants, keys,
//! routes, block rules), the outcome record it writes, the collaborator
//! interfaces that supply them, and an in-memory arena implementing those
//! interfaces.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod backend;
mod block;
mod catalog;
pub mod circuit;
pub mod clock;
mod error;
pub mod headers;
mod outcome;
mod plan;
mod route;
mod store;
mod tenant;

pub use backend::{BackendError, SharedBackend};
pub use block::{BlockRule, BlockTarget};
pub use catalog::{IssuedKey, MemoryCatalog};
pub use circuit::BackendCircuit;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{GatewayError, HttpError, QuotaPeriod, UpstreamFailure};
pub use outcome::{CacheStatus, ErrorType, RequestLog};
pub use plan::{DefaultLimits, EffectiveLimits, Plan, PlanTier};
pub use route::{CachePolicy, QueryKeyRule, Route};
pub use store::{KeyStore, PlanStore, RequestLogSink, RouteStore, StoreError, TenantStore};
pub use tenant::{ApiKey, Capability, KeyStatus, Role, Tenant, generate_api_key, hash_secret, key_prefix};
