//! Stores for per-identifier rolling statistics
//!
//! With shared storage the whole window update runs as one Lua script so
//! concurrent instances never lose an increment. The in-process map keeps
//! the same per-entry atomicity through the `DashMap` shard lock.

use std::sync::OnceLock;

use dashmap::DashMap;
use heliox_core::{BackendError, SharedBackend};
use jiff::Timestamp;

use crate::stats::{DetectorParams, Evaluation, MAX_IDLE_WINDOWS, RateStats};

/// What is being counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Request,
    Error,
}

impl Signal {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Error => "error",
        }
    }
}

/// Close finished windows, update baselines and count the signal
const OBSERVE: &str = r"
local f = redis.call('HMGET', KEYS[1], 'start', 'count', 'errors', 'rate', 'err', 'mean', 'var', 'windows', 'streak')
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local alpha = tonumber(ARGV[3])
local threshold = tonumber(ARGV[4])
local warmup = tonumber(ARGV[5])
local min_stddev = tonumber(ARGV[6])
local max_error_ratio = tonumber(ARGV[7])
local min_error_samples = tonumber(ARGV[8])
local max_idle = tonumber(ARGV[9])
local start = tonumber(f[1]) or now
local count = tonumber(f[2]) or 0
local errors = tonumber(f[3]) or 0
local rate = tonumber(f[4]) or 0
local err = tonumber(f[5]) or 0
local mean = tonumber(f[6]) or 0
local var = tonumber(f[7]) or 0
local windows = tonumber(f[8]) or 0
local streak = tonumber(f[9]) or 0
local z = ''
local elapsed = now - start
if elapsed >= window then
  local finished = math.floor(elapsed / window)
  local closes = 1 + math.min(finished - 1, max_idle)
  local secs = window / 1000000
  for i = 1, closes do
    local sample = count / secs
    local err_sample = 0
    if count > 0 then
      err_sample = math.min(errors / count, 1)
    end
    if windows == 0 then
      rate = sample
      err = err_sample
      mean = sample
    else
      rate = alpha * sample + (1 - alpha) * rate
      if count > 0 then
        err = alpha * err_sample + (1 - alpha) * err
      end
    end
    windows = windows + 1
    local anomalous = false
    if windows > warmup then
      local sd = math.max(math.sqrt(var), min_stddev)
      local score = (sample - mean) / sd
      z = string.format('%.17g', score)
      anomalous = score > threshold or (count >= min_error_samples and err > max_error_ratio)
    end
    if anomalous then
      streak = streak + 1
    else
      streak = 0
      local diff = rate - mean
      mean = mean + alpha * diff
      var = (1 - alpha) * (var + alpha * diff * diff)
    end
    count = 0
    errors = 0
  end
  start = start + finished * window
end
if ARGV[10] == 'request' then
  count = count + 1
else
  errors = errors + 1
end
redis.call('HSET', KEYS[1],
  'start', string.format('%.0f', start),
  'count', count,
  'errors', errors,
  'rate', string.format('%.17g', rate),
  'err', string.format('%.17g', err),
  'mean', string.format('%.17g', mean),
  'var', string.format('%.17g', var),
  'windows', windows,
  'streak', streak)
redis.call('PEXPIRE', KEYS[1], ARGV[11])
return {streak, z}
";

fn observe_script() -> &'static redis::Script {
    static SCRIPT: OnceLock<redis::Script> = OnceLock::new();
    SCRIPT.get_or_init(|| redis::Script::new(OBSERVE))
}

/// In-process statistics
#[derive(Debug, Default)]
pub struct MemoryStats {
    entries: DashMap<String, RateStats>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, identifier: &str, signal: Signal, now: Timestamp, params: &DetectorParams) -> Evaluation {
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert_with(|| RateStats::new(now));

        match signal {
            Signal::Request => entry.record_request(now, params),
            Signal::Error => entry.record_error(now, params),
        }
    }

    pub fn reset_streak(&self, identifier: &str) {
        if let Some(mut entry) = self.entries.get_mut(identifier) {
            entry.reset_streak();
        }
    }

    pub fn get(&self, identifier: &str) -> Option<RateStats> {
        self.entries.get(identifier).map(|entry| entry.clone())
    }

    /// Drop identifiers idle for longer than the folded gap
    pub fn sweep(&self, now: Timestamp, params: &DetectorParams) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stats| !stats.is_stale(now, params));
        before.saturating_sub(self.entries.len())
    }
}

/// Statistics shared through Redis
#[derive(Debug, Clone)]
pub struct RedisStats {
    backend: SharedBackend,
}

impl RedisStats {
    pub const fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    pub async fn observe(
        &self,
        identifier: &str,
        signal: Signal,
        now: Timestamp,
        params: &DetectorParams,
    ) -> Result<Evaluation, BackendError> {
        let key = self.backend.key(&["abuse", identifier]);
        let window_us = u64::try_from(params.window.as_micros()).unwrap_or(u64::MAX).max(1);
        let ttl_ms = u64::try_from((params.window * (MAX_IDLE_WINDOWS + 1)).as_millis()).unwrap_or(u64::MAX);
        let params = *params;

        let (streak, z): (u32, String) = self
            .backend
            .run(|mut conn| async move {
                observe_script()
                    .key(&key)
                    .arg(now.as_microsecond())
                    .arg(window_us)
                    .arg(params.alpha)
                    .arg(params.threshold)
                    .arg(params.warmup)
                    .arg(params.min_stddev)
                    .arg(params.max_error_ratio)
                    .arg(params.min_error_samples)
                    .arg(MAX_IDLE_WINDOWS)
                    .arg(signal.as_str())
                    .arg(ttl_ms)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(Evaluation {
            z: z.parse().ok(),
            streak,
            flagged: streak >= params.consecutive,
        })
    }

    pub async fn reset_streak(&self, identifier: &str) -> Result<(), BackendError> {
        let key = self.backend.key(&["abuse", identifier]);
        self.backend
            .run(|mut conn| async move {
                redis::cmd("HSET")
                    .arg(&key)
                    .arg("streak")
                    .arg(0)
                    .query_async(&mut conn)
                    .await
            })
            .await
    }
}

/// Statistics backend with in-process fallback
#[derive(Debug)]
pub enum StatsStore {
    Memory(MemoryStats),
    Redis { primary: RedisStats, fallback: MemoryStats },
}

impl StatsStore {
    pub fn memory() -> Self {
        Self::Memory(MemoryStats::new())
    }

    pub fn redis(backend: SharedBackend) -> Self {
        Self::Redis {
            primary: RedisStats::new(backend),
            fallback: MemoryStats::new(),
        }
    }

    pub async fn observe(
        &self,
        identifier: &str,
        signal: Signal,
        now: Timestamp,
        params: &DetectorParams,
    ) -> Evaluation {
        match self {
            Self::Memory(memory) => memory.observe(identifier, signal, now, params),
            Self::Redis { primary, fallback } => match primary.observe(identifier, signal, now, params).await {
                Ok(evaluation) => evaluation,
                Err(_) => fallback.observe(identifier, signal, now, params),
            },
        }
    }

    pub async fn reset_streak(&self, identifier: &str) {
        match self {
            Self::Memory(memory) => memory.reset_streak(identifier),
            Self::Redis { primary, fallback } => {
                fallback.reset_streak(identifier);
                if let Err(e) = primary.reset_streak(identifier).await {
                    tracing::debug!(error = %e, identifier, "could not reset shared anomaly streak");
                }
            }
        }
    }

    pub fn sweep(&self, now: Timestamp, params: &DetectorParams) -> usize {
        match self {
            Self::Memory(memory) | Self::Redis { fallback: memory, .. } => memory.sweep(now, params),
        }
    }
}
