use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use heliox_core::{BackendError, BlockRule, BlockTarget, SharedBackend, SharedClock};
use jiff::Timestamp;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bloom::BloomFilter;

/// In-process block rules
#[derive(Debug, Default)]
pub struct MemoryRules {
    rules: DashMap<String, BlockRule>,
}

impl MemoryRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, rule: BlockRule) {
        self.rules.insert(rule.target.identifier(), rule);
    }

    pub fn remove(&self, identifier: &str) -> bool {
        self.rules.remove(identifier).is_some()
    }

    pub fn get(&self, identifier: &str, now: Timestamp) -> Option<BlockRule> {
        self.rules
            .get(identifier)
            .filter(|rule| rule.is_active(now))
            .map(|rule| rule.clone())
    }

    /// Active rules, dropping expired ones on the way
    pub fn active(&self, now: Timestamp) -> Vec<BlockRule> {
        self.rules.retain(|_, rule| rule.is_active(now));
        self.rules.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Block rules shared through Redis
///
/// Each rule is a JSON string expiring with the rule, plus a membership set
/// used to enumerate them for bloom rebuilds.
#[derive(Debug, Clone)]
pub struct RedisRules {
    backend: SharedBackend,
}

impl RedisRules {
    pub const fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    fn index_key(&self) -> String {
        self.backend.key(&["blocks"])
    }

    fn rule_key(&self, identifier: &str) -> String {
        self.backend.key(&["block", identifier])
    }

    pub async fn insert(&self, rule: &BlockRule, now: Timestamp) -> Result<(), BackendError> {
        let identifier = rule.target.identifier();
        let key = self.rule_key(&identifier);
        let index = self.index_key();
        let ttl_ms = u64::try_from(rule.remaining(now).as_millis()).unwrap_or(u64::MAX).max(1);
        let payload = serde_json::to_string(rule).map_err(|e| {
            BackendError::Redis(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "block rule serialization",
                e.to_string(),
            )))
        })?;

        self.backend
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .cmd("SET")
                    .arg(&key)
                    .arg(&payload)
                    .arg("PX")
                    .arg(ttl_ms)
                    .ignore()
                    .cmd("SADD")
                    .arg(&index)
                    .arg(&identifier)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await
    }

    pub async fn remove(&self, identifier: &str) -> Result<bool, BackendError> {
        let key = self.rule_key(identifier);
        let index = self.index_key();
        let identifier = identifier.to_string();

        let (deleted,): (u32,) = self
            .backend
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .cmd("DEL")
                    .arg(&key)
                    .cmd("SREM")
                    .arg(&index)
                    .arg(&identifier)
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(deleted > 0)
    }

    pub async fn get(&self, identifier: &str, now: Timestamp) -> Result<Option<BlockRule>, BackendError> {
        let key = self.rule_key(identifier);
        let payload: Option<String> = self
            .backend
            .run(|mut conn| async move { redis::cmd("GET").arg(&key).query_async(&mut conn).await })
            .await?;

        Ok(payload
            .and_then(|raw| decode(identifier, &raw))
            .filter(|rule| rule.is_active(now)))
    }

    pub async fn active(&self, now: Timestamp) -> Result<Vec<BlockRule>, BackendError> {
        let index = self.index_key();
        let members: Vec<String> = self
            .backend
            .run(|mut conn| async move { redis::cmd("SMEMBERS").arg(&index).query_async(&mut conn).await })
            .await?;

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members.iter().map(|m| self.rule_key(m)).collect();
        let payloads: Vec<Option<String>> = self
            .backend
            .run(|mut conn| async move { redis::cmd("MGET").arg(&keys).query_async(&mut conn).await })
            .await?;

        let mut rules = Vec::with_capacity(members.len());
        let mut expired = Vec::new();
        for (identifier, payload) in members.into_iter().zip(payloads) {
            match payload.and_then(|raw| decode(&identifier, &raw)) {
                Some(rule) if rule.is_active(now) => rules.push(rule),
                _ => expired.push(identifier),
            }
        }

        if !expired.is_empty() {
            let index = self.index_key();
            let pruned = self
                .backend
                .run(|mut conn| async move {
                    redis::cmd("SREM")
                        .arg(&index)
                        .arg(&expired)
                        .query_async::<()>(&mut conn)
                        .await
                })
                .await;
            if let Err(e) = pruned {
                tracing::debug!(error = %e, "could not prune expired block index entries");
            }
        }

        Ok(rules)
    }
}

fn decode(identifier: &str, raw: &str) -> Option<BlockRule> {
    match serde_json::from_str(raw) {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(error = %e, identifier, "ignoring malformed block rule");
            None
        }
    }
}

/// Authoritative rule store
///
/// With Redis configured, rules are written through to the in-process map
/// as well so blocks issued here keep applying while the backend is down.
/// Rules Redis refused are also held as pending: they stay visible next to
/// the shared set and are written back once the backend answers again.
#[derive(Debug)]
pub enum RuleStore {
    Memory(MemoryRules),
    Redis {
        primary: RedisRules,
        fallback: MemoryRules,
        pending: MemoryRules,
    },
}

impl RuleStore {
    pub fn memory() -> Self {
        Self::Memory(MemoryRules::new())
    }

    pub fn redis(backend: SharedBackend) -> Self {
        Self::Redis {
            primary: RedisRules::new(backend),
            fallback: MemoryRules::new(),
            pending: MemoryRules::new(),
        }
    }

    pub async fn insert(&self, rule: BlockRule, now: Timestamp) {
        match self {
            Self::Memory(memory) => memory.insert(rule),
            Self::Redis {
                primary,
                fallback,
                pending,
            } => {
                if let Err(e) = primary.insert(&rule, now).await {
                    tracing::warn!(error = %e, block = %rule.target, "block rule kept locally until redis recovers");
                    pending.insert(rule.clone());
                }
                fallback.insert(rule);
            }
        }
    }

    pub async fn remove(&self, identifier: &str) -> bool {
        match self {
            Self::Memory(memory) => memory.remove(identifier),
            Self::Redis {
                primary,
                fallback,
                pending,
            } => {
                let unsynced = pending.remove(identifier);
                let local = fallback.remove(identifier) || unsynced;
                match primary.remove(identifier).await {
                    Ok(shared) => shared || local,
                    Err(_) => local,
                }
            }
        }
    }

    pub async fn get(&self, identifier: &str, now: Timestamp) -> Option<BlockRule> {
        match self {
            Self::Memory(memory) => memory.get(identifier, now),
            Self::Redis {
                primary,
                fallback,
                pending,
            } => match primary.get(identifier, now).await {
                Ok(Some(rule)) => Some(rule),
                Ok(None) => pending.get(identifier, now),
                Err(_) => fallback.get(identifier, now),
            },
        }
    }

    pub async fn active(&self, now: Timestamp) -> Vec<BlockRule> {
        match self {
            Self::Memory(memory) => memory.active(now),
            Self::Redis {
                primary,
                fallback,
                pending,
            } => {
                write_back(primary, pending, now).await;
                match primary.active(now).await {
                    Ok(rules) => {
                        fallback.active(now);
                        merge_pending(rules, pending.active(now))
                    }
                    Err(_) => fallback.active(now),
                }
            }
        }
    }
}

/// Replay pending rules into Redis, keeping those it still refuses
async fn write_back(primary: &RedisRules, pending: &MemoryRules, now: Timestamp) {
    for rule in pending.active(now) {
        if primary.insert(&rule, now).await.is_err() {
            return;
        }
        pending.remove(&rule.target.identifier());
        tracing::info!(block = %rule.target, "pending block rule written back to redis");
    }
}

/// Shared rules plus pending ones Redis does not know yet
fn merge_pending(mut shared: Vec<BlockRule>, pending: Vec<BlockRule>) -> Vec<BlockRule> {
    for rule in pending {
        if !shared.iter().any(|known| known.target == rule.target) {
            shared.push(rule);
        }
    }
    shared
}

/// Sizing for the membership filter
#[derive(Debug, Clone, Copy)]
pub struct BloomSizing {
    pub expected_items: usize,
    pub false_positive_rate: f64,
}

/// Block list: bloom pre-check in front of the rule store
pub struct BlockList {
    rules: RuleStore,
    bloom: RwLock<Arc<BloomFilter>>,
    sizing: BloomSizing,
    clock: SharedClock,
}

impl BlockList {
    pub fn new(rules: RuleStore, sizing: BloomSizing, clock: SharedClock) -> Self {
        let empty = BloomFilter::new(sizing.expected_items, sizing.false_positive_rate);
        Self {
            rules,
            bloom: RwLock::new(Arc::new(empty)),
            sizing,
            clock,
        }
    }

    fn filter(&self) -> Arc<BloomFilter> {
        Arc::clone(&self.bloom.read().unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    /// Rule in effect for `target`, if any
    ///
    /// A bloom miss answers without touching the store. A bloom hit is
    /// always confirmed against the store before it counts.
    pub async fn check(&self, target: BlockTarget) -> Option<BlockRule> {
        let identifier = target.identifier();
        if !self.filter().might_contain(&identifier) {
            return None;
        }

        let rule = self.rules.get(&identifier, self.clock.now()).await;
        if rule.is_none() {
            tracing::trace!(%identifier, "bloom positive not confirmed");
        }
        rule
    }

    /// Store a rule and republish the filter
    pub async fn block(&self, rule: BlockRule) {
        let now = self.clock.now();
        self.rules.insert(rule, now).await;
        self.rebuild().await;
    }

    pub async fn unblock(&self, target: BlockTarget) -> bool {
        let removed = self.rules.remove(&target.identifier()).await;
        if removed {
            self.rebuild().await;
        }
        removed
    }

    /// Rules currently in effect
    pub async fn active(&self) -> Vec<BlockRule> {
        self.rules.active(self.clock.now()).await
    }

    /// Rebuild the filter from the active rule set and swap it in
    pub async fn rebuild(&self) -> usize {
        let rules = self.rules.active(self.clock.now()).await;
        let identifiers: Vec<String> = rules.iter().map(|rule| rule.target.identifier()).collect();
        let filter = BloomFilter::from_items(
            identifiers.iter().map(String::as_str),
            self.sizing.expected_items.max(identifiers.len()),
            self.sizing.false_positive_rate,
        );

        *self.bloom.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(filter);
        identifiers.len()
    }

    /// Periodically rebuild the filter so rules issued by other instances are picked up
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let list = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let count = list.rebuild().await;
                        tracing::trace!(count, "block filter refreshed");
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for BlockList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockList").field("sizing", &self.sizing).finish_non_exhaustive()
    }
}

/// Seconds a blocked client should wait, for `Retry-After`
pub fn retry_after(rule: &BlockRule, now: Timestamp) -> Duration {
    rule.remaining(now).max(Duration::from_secs(1))
}
