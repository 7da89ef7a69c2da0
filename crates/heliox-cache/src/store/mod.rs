//! Response stores
//!
//! Redis is primary when configured; lookups and stores fall back to the
//! in-process cache whenever it fails or its circuit is open.

pub mod memory;
pub mod redis;

use std::sync::Arc;

use jiff::Timestamp;

use self::memory::MemoryCache;
use self::redis::RedisCache;
use crate::entry::CachedResponse;

#[derive(Debug)]
pub enum CacheStore {
    Memory(MemoryCache),
    Redis { primary: RedisCache, fallback: MemoryCache },
}

impl CacheStore {
    pub async fn get(&self, key: &str, now: Timestamp) -> Option<Arc<CachedResponse>> {
        match self {
            Self::Memory(memory) => memory.get(key, now),
            Self::Redis { primary, fallback } => match primary.get(key, now).await {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "cache lookup served from local store");
                    fallback.get(key, now)
                }
            },
        }
    }

    pub async fn insert(&self, key: &str, entry: Arc<CachedResponse>, now: Timestamp) {
        match self {
            Self::Memory(memory) => memory.insert(key, entry),
            Self::Redis { primary, fallback } => {
                if let Err(e) = primary.insert(key, &entry, now).await {
                    tracing::debug!(error = %e, "cache store kept local only");
                    fallback.insert(key, entry);
                }
            }
        }
    }

    pub async fn invalidate(&self, key: &str) {
        match self {
            Self::Memory(memory) => memory.invalidate(key),
            Self::Redis { primary, fallback } => {
                fallback.invalidate(key);
                if let Err(e) = primary.invalidate(key).await {
                    tracing::debug!(error = %e, "shared cache invalidation failed");
                }
            }
        }
    }
}
