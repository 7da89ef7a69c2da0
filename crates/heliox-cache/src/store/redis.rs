use std::sync::Arc;
use std::time::Duration;

use heliox_core::SharedBackend;
use jiff::Timestamp;

use crate::entry::{CachedResponse, Freshness};
use crate::error::CacheError;

/// Response store shared through Redis, one JSON document per key
#[derive(Debug, Clone)]
pub struct RedisCache {
    backend: SharedBackend,
    max_entry_age: Duration,
}

impl RedisCache {
    pub const fn new(backend: SharedBackend, max_entry_age: Duration) -> Self {
        Self { backend, max_entry_age }
    }

    pub async fn get(&self, key: &str, now: Timestamp) -> Result<Option<Arc<CachedResponse>>, CacheError> {
        let redis_key = self.backend.key(&["cache", key]);
        let payload: Option<String> = self
            .backend
            .run(|mut conn| async move { redis::cmd("GET").arg(&redis_key).query_async(&mut conn).await })
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        let entry: CachedResponse =
            serde_json::from_str(&payload).map_err(|e| CacheError::Serialization(format!("deserialize: {e}")))?;

        if entry.freshness(now) == Freshness::Expired {
            return Ok(None);
        }
        Ok(Some(Arc::new(entry)))
    }

    pub async fn insert(&self, key: &str, entry: &CachedResponse, now: Timestamp) -> Result<(), CacheError> {
        let redis_key = self.backend.key(&["cache", key]);
        let payload =
            serde_json::to_string(entry).map_err(|e| CacheError::Serialization(format!("serialize: {e}")))?;
        let ttl_ms = entry
            .retention(now)
            .min(self.max_entry_age)
            .as_millis()
            .clamp(1, u128::from(u64::MAX));
        let ttl_ms = u64::try_from(ttl_ms).unwrap_or(u64::MAX);

        self.backend
            .run(|mut conn| async move {
                redis::cmd("SET")
                    .arg(&redis_key)
                    .arg(&payload)
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await?;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let redis_key = self.backend.key(&["cache", key]);
        self.backend
            .run(|mut conn| async move { redis::cmd("DEL").arg(&redis_key).query_async::<()>(&mut conn).await })
            .await?;
        Ok(())
    }
}
