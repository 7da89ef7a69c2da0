use std::time::Duration;

use heliox_core::clock;
use jiff::Timestamp;

/// Refill rate and capacity of one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketLimits {
    /// Tokens added per second, always positive
    pub rate: f64,
    /// Maximum tokens held
    pub burst: u32,
}

impl BucketLimits {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate: if rate > 0.0 { rate } else { f64::MIN_POSITIVE },
            burst: burst.max(1),
        }
    }

    pub fn capacity(&self) -> f64 {
        f64::from(self.burst)
    }

    /// Time for an empty bucket to fill completely
    pub fn full_refill(&self) -> Duration {
        Duration::try_from_secs_f64(self.capacity() / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Outcome of taking one token
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketDecision {
    Admitted { remaining: f64 },
    Limited { retry_after: Duration },
}

impl BucketDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Decision from the token count left after a take attempt
    pub fn from_tokens(admitted: bool, tokens: f64, limits: BucketLimits) -> Self {
        if admitted {
            Self::Admitted { remaining: tokens }
        } else {
            Self::Limited {
                retry_after: retry_after(tokens, limits.rate),
            }
        }
    }
}

/// Time until the bucket holds one full token
pub fn retry_after(tokens: f64, rate: f64) -> Duration {
    let secs = ((1.0 - tokens) / rate).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Token-bucket state for one subject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub tokens: f64,
    pub last_refill: Timestamp,
}

impl TokenBucket {
    /// Bucket starting at capacity
    pub fn full(limits: BucketLimits, now: Timestamp) -> Self {
        Self {
            tokens: limits.capacity(),
            last_refill: now,
        }
    }

    /// Refill for elapsed time, then take one token if available
    pub fn take(&mut self, limits: BucketLimits, now: Timestamp) -> BucketDecision {
        self.refill(limits, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            BucketDecision::Admitted { remaining: self.tokens }
        } else {
            BucketDecision::Limited {
                retry_after: retry_after(self.tokens, limits.rate),
            }
        }
    }

    fn refill(&mut self, limits: BucketLimits, now: Timestamp) {
        if now > self.last_refill {
            let elapsed = clock::elapsed(self.last_refill, now).as_secs_f64();
            self.tokens = (self.tokens + elapsed * limits.rate).min(limits.capacity());
            self.last_refill = now;
        }
        // limits may shrink between calls
        self.tokens = self.tokens.min(limits.capacity());
    }

    /// Whether the bucket has refilled completely and can be forgotten
    pub fn is_idle(&self, limits: BucketLimits, now: Timestamp) -> bool {
        clock::elapsed(self.last_refill, now) >= limits.full_refill()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millisecond(ms).unwrap()
    }

    #[test]
    fn admits_burst_then_limits() {
        let limits = BucketLimits::new(10.0, 20);
        let mut bucket = TokenBucket::full(limits, at(0));

        let admitted = (0..30).filter(|_| bucket.take(limits, at(0)).is_admitted()).count();

        assert_eq!(admitted, 20);
    }

    #[test]
    fn retry_after_reflects_deficit() {
        let limits = BucketLimits::new(10.0, 1);
        let mut bucket = TokenBucket::full(limits, at(0));
        bucket.take(limits, at(0));

        let BucketDecision::Limited { retry_after } = bucket.take(limits, at(0)) else {
            panic!("expected limit");
        };

        assert_eq!(retry_after, Duration::from_millis(100));
    }

    #[test]
    fn refills_over_time_up_to_capacity() {
        let limits = BucketLimits::new(10.0, 5);
        let mut bucket = TokenBucket::full(limits, at(0));
        for _ in 0..5 {
            bucket.take(limits, at(0));
        }

        assert!(bucket.take(limits, at(100)).is_admitted());
        assert!(!bucket.take(limits, at(100)).is_admitted());

        bucket.take(limits, at(60_000));
        assert!(bucket.tokens <= 4.0 + f64::EPSILON);
    }

    #[test]
    fn clock_going_backwards_does_not_refill() {
        let limits = BucketLimits::new(1.0, 1);
        let mut bucket = TokenBucket::full(limits, at(10_000));
        bucket.take(limits, at(10_000));

        assert!(!bucket.take(limits, at(5_000)).is_admitted());
    }

    #[test]
    fn idle_after_full_refill_time() {
        let limits = BucketLimits::new(2.0, 10);
        let bucket = TokenBucket::full(limits, at(0));

        assert!(!bucket.is_idle(limits, at(4_000)));
        assert!(bucket.is_idle(limits, at(5_000)));
    }
}
