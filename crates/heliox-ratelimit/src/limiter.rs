use std::sync::Arc;

use heliox_core::SharedClock;
use uuid::Uuid;

use crate::bucket::{BucketDecision, BucketLimits};
use crate::error::RateLimitError;
use crate::storage::CounterStore;

/// Token-bucket admission per key, optionally also per tenant
pub struct RateLimiter {
    store: Arc<CounterStore>,
    clock: SharedClock,
    per_tenant: bool,
}

/// Who a request is charged to and at what limits
#[derive(Debug, Clone, Copy)]
pub struct RateSubject {
    pub key_id: Uuid,
    pub key_limits: BucketLimits,
    pub tenant_id: Uuid,
    /// Plan-level limits shared by all of the tenant's keys
    pub tenant_limits: BucketLimits,
}

impl RateLimiter {
    pub fn new(store: Arc<CounterStore>, clock: SharedClock, per_tenant: bool) -> Self {
        Self {
            store,
            clock,
            per_tenant,
        }
    }

    /// Take one token from the key bucket, then from the tenant bucket
    ///
    /// A key token spent before a tenant rejection is not refunded.
    pub async fn check(&self, subject: &RateSubject) -> Result<(), RateLimitError> {
        let now = self.clock.now();

        let key = format!("key:{}", subject.key_id);
        if let BucketDecision::Limited { retry_after } = self.store.take_token(&key, subject.key_limits, now).await {
            tracing::debug!(key_id = %subject.key_id, ?retry_after, "key rate limit exceeded");
            return Err(RateLimitError::Exceeded { retry_after });
        }

        if self.per_tenant {
            let tenant = format!("tenant:{}", subject.tenant_id);
            if let BucketDecision::Limited { retry_after } =
                self.store.take_token(&tenant, subject.tenant_limits, now).await
            {
                tracing::debug!(tenant_id = %subject.tenant_id, ?retry_after, "tenant rate limit exceeded");
                return Err(RateLimitError::Exceeded { retry_after });
            }
        }

        Ok(())
    }
}
