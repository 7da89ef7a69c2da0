use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use heliox_config::CacheConfig;
use heliox_core::{CachePolicy, CacheStatus, SharedBackend, SharedClock};
use http::HeaderMap;
use http::header::{CACHE_CONTROL, SET_COOKIE};

use crate::entry::{CachedResponse, Freshness};
use crate::store::CacheStore;
use crate::store::memory::MemoryCache;
use crate::store::redis::RedisCache;

/// Result of a cache lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    Hit(Arc<CachedResponse>),
    Stale(Arc<CachedResponse>),
    Miss,
}

impl Lookup {
    pub const fn status(&self) -> CacheStatus {
        match self {
            Self::Hit(_) => CacheStatus::Hit,
            Self::Stale(_) => CacheStatus::Stale,
            Self::Miss => CacheStatus::Miss,
        }
    }
}

/// What happened to a response offered for storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    /// Status, method or response directives forbid caching
    NotCacheable,
    /// Body exceeds the policy limit, served as pass-through
    TooLarge,
}

/// Route response cache with stale serving and revalidation dedupe
pub struct ResponseCache {
    store: CacheStore,
    clock: SharedClock,
    revalidating: Arc<DashSet<String>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig, backend: Option<SharedBackend>, clock: SharedClock) -> Self {
        let local = MemoryCache::new(config.max_memory, config.max_entry_age);
        let store = match backend {
            Some(backend) => CacheStore::Redis {
                primary: RedisCache::new(backend, config.max_entry_age),
                fallback: local,
            },
            None => CacheStore::Memory(local),
        };

        Self {
            store,
            clock,
            revalidating: Arc::new(DashSet::new()),
        }
    }

    /// Whether a request may be served from or stored into the cache
    pub fn accepts_request(policy: &CachePolicy, method: &str, headers: &HeaderMap) -> bool {
        policy.caches_method(method) && !has_directive(headers, &["no-store"])
    }

    pub async fn lookup(&self, key: &str) -> Lookup {
        let now = self.clock.now();
        match self.store.get(key, now).await {
            Some(entry) => match entry.freshness(now) {
                Freshness::Fresh => Lookup::Hit(entry),
                Freshness::Stale => Lookup::Stale(entry),
                Freshness::Expired => Lookup::Miss,
            },
            None => Lookup::Miss,
        }
    }

    /// Offer an upstream response for storage
    pub async fn store(
        &self,
        key: &str,
        policy: &CachePolicy,
        status: u16,
        headers: &HeaderMap,
        body: Bytes,
    ) -> StoreOutcome {
        if body.len() > policy.max_body_size {
            tracing::debug!(size = body.len(), max = policy.max_body_size, "response too large to cache");
            return StoreOutcome::TooLarge;
        }
        if !policy.caches_status(status)
            || has_directive(headers, &["no-store", "private"])
            || headers.contains_key(SET_COOKIE)
        {
            return StoreOutcome::NotCacheable;
        }

        let now = self.clock.now();
        let entry = CachedResponse::new(status, headers, body, policy, now);
        self.store.insert(key, Arc::new(entry), now).await;
        StoreOutcome::Stored
    }

    pub async fn invalidate(&self, key: &str) {
        self.store.invalidate(key).await;
    }

    /// Claim the background refresh of a stale key
    ///
    /// Returns `None` while another refresh for the same key is in flight.
    /// The claim is released when the guard drops.
    pub fn begin_revalidation(&self, key: &str) -> Option<RevalidationGuard> {
        if !self.revalidating.insert(key.to_string()) {
            return None;
        }
        Some(RevalidationGuard {
            key: key.to_string(),
            revalidating: Arc::clone(&self.revalidating),
        })
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.store)
            .field("revalidating", &self.revalidating.len())
            .finish_non_exhaustive()
    }
}

/// In-flight revalidation claim
#[derive(Debug)]
pub struct RevalidationGuard {
    key: String,
    revalidating: Arc<DashSet<String>>,
}

impl RevalidationGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RevalidationGuard {
    fn drop(&mut self) {
        self.revalidating.remove(&self.key);
    }
}

fn has_directive(headers: &HeaderMap, directives: &[&str]) -> bool {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|token| directives.iter().any(|d| token.eq_ignore_ascii_case(d)))
}
