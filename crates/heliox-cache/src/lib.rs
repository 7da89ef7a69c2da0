//! Response cache for routes with a cache policy
//!
//! Keys are SHA-256 fingerprints of the route, method, normalized path and
//! the query parameters and headers the policy selects. Entries are served
//! fresh until their TTL, then stale for the policy's stale window, then
//! treated as absent.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod cache;
mod entry;
mod error;
mod key;
pub mod store;

pub use cache::{Lookup, ResponseCache, RevalidationGuard, StoreOutcome};
pub use entry::{CachedResponse, Freshness};
pub use error::CacheError;
pub use key::{cache_key, normalize_path};
