use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use heliox_config::EdgeGuardConfig;

use crate::error::RateLimitError;

type KeyedLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Per-client-IP flood guard in front of credential resolution
///
/// Always in-process: it only has to shed floods before they reach the
/// shared counters.
pub struct EdgeGuard {
    limiter: KeyedLimiter,
    clock: DefaultClock,
}

impl EdgeGuard {
    /// Allow `requests` per `window` per client IP
    pub fn new(config: &EdgeGuardConfig) -> Result<Self, RateLimitError> {
        if config.window.is_zero() {
            return Err(RateLimitError::Config("edge guard window must be > 0".to_string()));
        }

        let burst = NonZeroU32::new(config.requests)
            .ok_or_else(|| RateLimitError::Config("edge guard requests must be > 0".to_string()))?;
        let replenish_interval = config.window / burst.get();

        let quota = Quota::with_period(replenish_interval.max(Duration::from_nanos(1)))
            .ok_or_else(|| RateLimitError::Config("invalid edge guard period".to_string()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: RateLimiter::dashmap(quota),
            clock: DefaultClock::default(),
        })
    }

    /// Check if a request from `ip` is allowed
    pub fn check(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.limiter.check_key(&ip).map_err(|not_until| RateLimitError::Exceeded {
            retry_after: not_until.wait_time_from(self.clock.now()),
        })
    }

    /// Forget IPs whose allowance has fully recovered
    pub fn sweep(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}
