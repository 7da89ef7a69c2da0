use std::sync::Arc;

use heliox_core::{EffectiveLimits, QuotaPeriod, SharedClock};
use uuid::Uuid;

use crate::error::RateLimitError;
use crate::period::QuotaWindow;
use crate::storage::CounterStore;

/// Quota limits for one key, `0` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily: u64,
    pub monthly: u64,
}

impl From<&EffectiveLimits> for QuotaLimits {
    fn from(limits: &EffectiveLimits) -> Self {
        Self {
            daily: limits.quota_daily,
            monthly: limits.quota_monthly,
        }
    }
}

impl QuotaLimits {
    pub const fn is_unlimited(&self) -> bool {
        self.daily == 0 && self.monthly == 0
    }

    /// Decide on counts observed before this request
    pub fn decide(&self, daily: u64, monthly: u64) -> QuotaDecision {
        let usage = QuotaUsage { daily, monthly };
        if self.daily > 0 && daily >= self.daily {
            QuotaDecision::Exceeded {
                period: QuotaPeriod::Daily,
                usage,
            }
        } else if self.monthly > 0 && monthly >= self.monthly {
            QuotaDecision::Exceeded {
                period: QuotaPeriod::Monthly,
                usage,
            }
        } else {
            QuotaDecision::Admitted(usage)
        }
    }
}

/// Requests counted in the current periods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaUsage {
    pub daily: u64,
    pub monthly: u64,
}

/// Display percentage, capped at 100 and `0` for unlimited
#[allow(clippy::cast_precision_loss)]
pub fn percent_used(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (used as f64 / limit as f64 * 100.0).min(100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Admitted(QuotaUsage),
    Exceeded { period: QuotaPeriod, usage: QuotaUsage },
}

impl QuotaDecision {
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    #[must_use]
    pub const fn with_usage(self, usage: QuotaUsage) -> Self {
        match self {
            Self::Admitted(_) => Self::Admitted(usage),
            Self::Exceeded { period, .. } => Self::Exceeded { period, usage },
        }
    }
}

/// Daily and monthly request accounting per key
///
/// Independent from the token bucket: a request rejected here has already
/// consumed a rate-limit token, and a rejected request is never counted.
pub struct QuotaAccountant {
    store: Arc<CounterStore>,
    clock: SharedClock,
}

impl QuotaAccountant {
    pub fn new(store: Arc<CounterStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Count one request against the key's quotas
    pub async fn consume(&self, key_id: Uuid, limits: QuotaLimits) -> Result<QuotaUsage, RateLimitError> {
        if limits.is_unlimited() {
            return Ok(QuotaUsage::default());
        }

        let now = self.clock.now();
        let window = QuotaWindow::at(now);
        let subject = key_id.to_string();

        match self.store.consume_quota(&subject, limits, &window, now).await {
            QuotaDecision::Admitted(usage) => Ok(usage),
            QuotaDecision::Exceeded { period, usage } => {
                tracing::debug!(%key_id, %period, daily = usage.daily, monthly = usage.monthly, "quota exhausted");
                let retry_after = match period {
                    QuotaPeriod::Daily => window.until_day_reset(now),
                    QuotaPeriod::Monthly => window.until_month_reset(now),
                };
                Err(RateLimitError::QuotaExceeded { period, retry_after })
            }
        }
    }

    /// Live counters for the key's current day and month
    pub async fn usage(&self, key_id: Uuid) -> QuotaUsage {
        let window = QuotaWindow::at(self.clock.now());
        self.store.quota_usage(&key_id.to_string(), &window).await
    }
}
