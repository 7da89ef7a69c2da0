use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use mini_moka::sync::Cache;

use crate::entry::{CachedResponse, Freshness};

/// In-process response store bounded by total weight
///
/// Entries are weighed by body and header size against `max_memory`.
/// Every entry is also dropped after `max_entry_age` regardless of its own
/// stale deadline.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Arc<CachedResponse>>,
}

impl MemoryCache {
    pub fn new(max_memory: u64, max_entry_age: Duration) -> Self {
        let entries = Cache::builder()
            .weigher(|_key: &String, entry: &Arc<CachedResponse>| u32::try_from(entry.weight()).unwrap_or(u32::MAX))
            .max_capacity(max_memory)
            .time_to_live(max_entry_age)
            .build();

        Self { entries }
    }

    /// Entry still servable at `now`
    pub fn get(&self, key: &str, now: Timestamp) -> Option<Arc<CachedResponse>> {
        let key = key.to_string();
        let entry = self.entries.get(&key)?;
        if entry.freshness(now) == Freshness::Expired {
            self.entries.invalidate(&key);
            return None;
        }
        Some(entry)
    }

    pub fn insert(&self, key: &str, entry: Arc<CachedResponse>) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(&key.to_string());
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
