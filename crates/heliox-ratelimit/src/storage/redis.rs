use std::sync::OnceLock;
use std::time::Duration;

use heliox_core::{BackendError, SharedBackend};
use jiff::Timestamp;

use crate::bucket::{BucketDecision, BucketLimits};
use crate::period::QuotaWindow;
use crate::quota::{QuotaDecision, QuotaLimits, QuotaUsage};

/// Refill, take one token and persist in a single round trip
const TAKE_TOKEN: &str = r"
local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local rate = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
  tokens = capacity
  ts = now
end
if now > ts then
  tokens = tokens + (now - ts) / 1000 * rate
  ts = now
end
if tokens > capacity then
  tokens = capacity
end
local admitted = 0
if tokens >= 1 then
  tokens = tokens - 1
  admitted = 1
end
redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(ts))
redis.call('PEXPIRE', KEYS[1], ARGV[4])
return {admitted, tostring(tokens)}
";

/// Check both counters and increment the limited ones only when neither is exhausted
const CONSUME_QUOTA: &str = r"
local daily = tonumber(redis.call('GET', KEYS[1]) or '0')
local monthly = tonumber(redis.call('GET', KEYS[2]) or '0')
local daily_limit = tonumber(ARGV[1])
local monthly_limit = tonumber(ARGV[2])
if daily_limit > 0 and daily >= daily_limit then
  return {1, daily, monthly}
end
if monthly_limit > 0 and monthly >= monthly_limit then
  return {2, daily, monthly}
end
if daily_limit > 0 then
  daily = redis.call('INCR', KEYS[1])
  redis.call('EXPIRE', KEYS[1], ARGV[3])
end
if monthly_limit > 0 then
  monthly = redis.call('INCR', KEYS[2])
  redis.call('EXPIRE', KEYS[2], ARGV[4])
end
return {0, daily, monthly}
";

fn take_token_script() -> &'static redis::Script {
    static SCRIPT: OnceLock<redis::Script> = OnceLock::new();
    SCRIPT.get_or_init(|| redis::Script::new(TAKE_TOKEN))
}

fn consume_quota_script() -> &'static redis::Script {
    static SCRIPT: OnceLock<redis::Script> = OnceLock::new();
    SCRIPT.get_or_init(|| redis::Script::new(CONSUME_QUOTA))
}

/// Redis-backed counters shared by every gateway instance
#[derive(Clone, Debug)]
pub struct RedisCounters {
    backend: SharedBackend,
}

impl RedisCounters {
    pub const fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    pub const fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub async fn take_token(
        &self,
        subject: &str,
        limits: BucketLimits,
        now: Timestamp,
    ) -> Result<BucketDecision, BackendError> {
        let key = self.backend.key(&["bucket", subject]);
        // keep state until the bucket would have refilled anyway
        let ttl_ms = limits
            .full_refill()
            .saturating_add(Duration::from_secs(1))
            .as_millis()
            .min(u128::from(u32::MAX));

        let (admitted, tokens): (i64, String) = self
            .backend
            .run(|mut conn| async move {
                take_token_script()
                    .key(&key)
                    .arg(limits.rate)
                    .arg(limits.burst)
                    .arg(now.as_millisecond())
                    .arg(u64::try_from(ttl_ms).unwrap_or(u64::MAX))
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        let tokens = tokens.parse::<f64>().unwrap_or(0.0);
        Ok(BucketDecision::from_tokens(admitted == 1, tokens, limits))
    }

    pub async fn consume_quota(
        &self,
        subject: &str,
        limits: QuotaLimits,
        window: &QuotaWindow,
        now: Timestamp,
    ) -> Result<QuotaDecision, BackendError> {
        let daily_key = self.backend.key(&["quota", subject, "d", &window.day]);
        let monthly_key = self.backend.key(&["quota", subject, "m", &window.month]);
        let daily_ttl = window.until_day_reset(now).as_secs() + 60;
        let monthly_ttl = window.until_month_reset(now).as_secs() + 60;

        let (code, daily, monthly): (i64, u64, u64) = self
            .backend
            .run(|mut conn| async move {
                consume_quota_script()
                    .key(&daily_key)
                    .key(&monthly_key)
                    .arg(limits.daily)
                    .arg(limits.monthly)
                    .arg(daily_ttl)
                    .arg(monthly_ttl)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        let usage = QuotaUsage { daily, monthly };
        Ok(match code {
            1 => QuotaDecision::Exceeded {
                period: heliox_core::QuotaPeriod::Daily,
                usage,
            },
            2 => QuotaDecision::Exceeded {
                period: heliox_core::QuotaPeriod::Monthly,
                usage,
            },
            _ => QuotaDecision::Admitted(usage),
        })
    }

    pub async fn quota_usage(&self, subject: &str, window: &QuotaWindow) -> Result<QuotaUsage, BackendError> {
        let daily_key = self.backend.key(&["quota", subject, "d", &window.day]);
        let monthly_key = self.backend.key(&["quota", subject, "m", &window.month]);

        let (daily, monthly): (Option<u64>, Option<u64>) = self
            .backend
            .run(|mut conn| async move {
                redis::cmd("MGET")
                    .arg(&daily_key)
                    .arg(&monthly_key)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(QuotaUsage {
            daily: daily.unwrap_or(0),
            monthly: monthly.unwrap_or(0),
        })
    }
}
