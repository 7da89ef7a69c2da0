use dashmap::DashMap;
use jiff::Timestamp;

use crate::bucket::{BucketDecision, BucketLimits, TokenBucket};
use crate::period::QuotaWindow;
use crate::quota::{QuotaDecision, QuotaLimits, QuotaUsage};

/// Daily and monthly counts for one key, tagged with their period
#[derive(Debug, Clone, Default)]
struct QuotaCounts {
    day: String,
    daily: u64,
    month: String,
    monthly: u64,
}

impl QuotaCounts {
    fn roll(&mut self, window: &QuotaWindow) {
        if self.day != window.day {
            self.day.clone_from(&window.day);
            self.daily = 0;
        }
        if self.month != window.month {
            self.month.clone_from(&window.month);
            self.monthly = 0;
        }
    }
}

/// In-process counters, one `DashMap` entry lock per subject
///
/// Every read-modify-write happens while holding the subject's entry guard,
/// so concurrent requests for the same key never lose updates.
#[derive(Debug, Default)]
pub struct MemoryCounters {
    buckets: DashMap<String, (TokenBucket, BucketLimits)>,
    quotas: DashMap<String, QuotaCounts>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from the subject's bucket
    pub fn take_token(&self, subject: &str, limits: BucketLimits, now: Timestamp) -> BucketDecision {
        let mut entry = self
            .buckets
            .entry(subject.to_string())
            .or_insert_with(|| (TokenBucket::full(limits, now), limits));
        let (bucket, stored) = entry.value_mut();
        *stored = limits;
        bucket.take(limits, now)
    }

    /// Check both quota counters and count the request if neither is exhausted
    pub fn consume_quota(&self, subject: &str, limits: QuotaLimits, window: &QuotaWindow) -> QuotaDecision {
        let mut entry = self.quotas.entry(subject.to_string()).or_default();
        let counts = entry.value_mut();
        counts.roll(window);

        let decision = limits.decide(counts.daily, counts.monthly);
        if decision.is_admitted() {
            if limits.daily > 0 {
                counts.daily += 1;
            }
            if limits.monthly > 0 {
                counts.monthly += 1;
            }
        }

        decision.with_usage(QuotaUsage {
            daily: counts.daily,
            monthly: counts.monthly,
        })
    }

    /// Current counts without consuming
    pub fn quota_usage(&self, subject: &str, window: &QuotaWindow) -> QuotaUsage {
        self.quotas.get(subject).map_or_else(QuotaUsage::default, |counts| QuotaUsage {
            daily: if counts.day == window.day { counts.daily } else { 0 },
            monthly: if counts.month == window.month { counts.monthly } else { 0 },
        })
    }

    /// Drop refilled buckets and counters from past periods
    pub fn sweep(&self, now: Timestamp) -> usize {
        let window = QuotaWindow::at(now);
        let before = self.buckets.len() + self.quotas.len();

        self.buckets.retain(|_, (bucket, limits)| !bucket.is_idle(*limits, now));
        self.quotas.retain(|_, counts| counts.month == window.month);

        before.saturating_sub(self.buckets.len() + self.quotas.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use heliox_core::clock;

    use super::*;

    fn now() -> Timestamp {
        "2026-03-10T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn concurrent_takes_never_exceed_burst() {
        let counters = Arc::new(MemoryCounters::new());
        let limits = BucketLimits::new(1.0, 50);
        let t = now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| counters.take_token("key:a", limits, t).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn quota_counts_only_admitted_requests() {
        let counters = MemoryCounters::new();
        let limits = QuotaLimits { daily: 2, monthly: 0 };
        let window = QuotaWindow::at(now());

        assert!(counters.consume_quota("k", limits, &window).is_admitted());
        assert!(counters.consume_quota("k", limits, &window).is_admitted());
        assert!(!counters.consume_quota("k", limits, &window).is_admitted());
        assert!(!counters.consume_quota("k", limits, &window).is_admitted());

        let usage = counters.quota_usage("k", &window);
        assert_eq!(usage.daily, 2);
        assert_eq!(usage.monthly, 0);
    }

    #[test]
    fn daily_counter_resets_at_utc_midnight() {
        let counters = MemoryCounters::new();
        let limits = QuotaLimits { daily: 1, monthly: 10 };
        let today = QuotaWindow::at(now());

        assert!(counters.consume_quota("k", limits, &today).is_admitted());
        assert!(!counters.consume_quota("k", limits, &today).is_admitted());

        let tomorrow = QuotaWindow::at(today.day_reset);
        assert!(counters.consume_quota("k", limits, &tomorrow).is_admitted());
        assert_eq!(counters.quota_usage("k", &tomorrow).monthly, 2);
    }

    #[test]
    fn sweep_drops_idle_buckets() {
        let counters = MemoryCounters::new();
        let limits = BucketLimits::new(10.0, 10);
        counters.take_token("k", limits, now());

        assert_eq!(counters.sweep(now()), 0);
        assert_eq!(counters.sweep(clock::add(now(), Duration::from_secs(2))), 1);
    }
}
