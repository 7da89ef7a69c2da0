//! Counter backends for token buckets and quotas
//!
//! The Redis backend is primary when configured. Whenever its circuit is
//! open or a call fails, the same operation runs against an in-process
//! [`MemoryCounters`] with the same atomicity guarantees.

pub mod memory;
pub mod redis;

use heliox_core::SharedBackend;
use jiff::Timestamp;

use self::memory::MemoryCounters;
use self::redis::RedisCounters;
use crate::bucket::{BucketDecision, BucketLimits};
use crate::period::QuotaWindow;
use crate::quota::{QuotaDecision, QuotaLimits, QuotaUsage};

#[derive(Debug)]
pub enum CounterStore {
    Memory(MemoryCounters),
    Redis {
        primary: RedisCounters,
        fallback: MemoryCounters,
    },
}

impl CounterStore {
    pub fn memory() -> Self {
        Self::Memory(MemoryCounters::new())
    }

    pub fn redis(backend: SharedBackend) -> Self {
        Self::Redis {
            primary: RedisCounters::new(backend),
            fallback: MemoryCounters::new(),
        }
    }

    pub async fn take_token(&self, subject: &str, limits: BucketLimits, now: Timestamp) -> BucketDecision {
        match self {
            Self::Memory(memory) => memory.take_token(subject, limits, now),
            Self::Redis { primary, fallback } => match primary.take_token(subject, limits, now).await {
                Ok(decision) => decision,
                Err(_) => fallback.take_token(subject, limits, now),
            },
        }
    }

    pub async fn consume_quota(
        &self,
        subject: &str,
        limits: QuotaLimits,
        window: &QuotaWindow,
        now: Timestamp,
    ) -> QuotaDecision {
        match self {
            Self::Memory(memory) => memory.consume_quota(subject, limits, window),
            Self::Redis { primary, fallback } => match primary.consume_quota(subject, limits, window, now).await {
                Ok(decision) => decision,
                Err(_) => fallback.consume_quota(subject, limits, window),
            },
        }
    }

    pub async fn quota_usage(&self, subject: &str, window: &QuotaWindow) -> QuotaUsage {
        match self {
            Self::Memory(memory) => memory.quota_usage(subject, window),
            Self::Redis { primary, fallback } => match primary.quota_usage(subject, window).await {
                Ok(usage) => usage,
                Err(_) => fallback.quota_usage(subject, window),
            },
        }
    }

    /// Drop idle in-process state
    pub fn sweep(&self, now: Timestamp) -> usize {
        match self {
            Self::Memory(memory) | Self::Redis { fallback: memory, .. } => memory.sweep(now),
        }
    }
}
