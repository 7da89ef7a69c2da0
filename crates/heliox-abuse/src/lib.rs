//! Abuse detection and block list
//!
//! [`AbuseDetector`] keeps rolling request-rate and error-ratio statistics
//! per API key and per client IP and blocks identifiers whose rate stays
//! anomalous for consecutive windows. Blocks are enforced through
//! [`BlockList`], a bloom filter in front of the authoritative rule store.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod blocklist;
mod bloom;
mod detector;
mod error;
mod notify;
mod stats;
mod store;

pub use blocklist::{BlockList, BloomSizing, MemoryRules, RedisRules, RuleStore, retry_after};
pub use bloom::BloomFilter;
pub use detector::{AbuseDetector, is_error_status};
pub use error::AbuseError;
pub use notify::{BlockEvent, BlockNotifier};
pub use stats::{DetectorParams, Evaluation, MAX_IDLE_WINDOWS, RateStats};
pub use store::{MemoryStats, RedisStats, Signal, StatsStore};
