//! Rate and quota admission gates
//!
//! [`RateLimiter`] enforces token buckets per key (and optionally per
//! tenant). [`QuotaAccountant`] enforces daily and monthly request counts.
//! Both run against a [`storage::CounterStore`], Redis-backed when shared
//! storage is configured, with an in-process fallback.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod bucket;
mod edge;
mod error;
mod limiter;
mod period;
mod quota;
pub mod storage;

pub use bucket::{BucketDecision, BucketLimits, TokenBucket};
pub use edge::EdgeGuard;
pub use error::RateLimitError;
pub use limiter::{RateLimiter, RateSubject};
pub use period::QuotaWindow;
pub use quota::{QuotaAccountant, QuotaDecision, QuotaLimits, QuotaUsage, percent_used};
pub use storage::CounterStore;
