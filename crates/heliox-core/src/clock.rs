//! Wall-clock abstraction
//!
//! Every time-dependent decision in the pipeline (bucket refill, quota
//! periods, cache freshness, block expiry, evaluation windows) reads the
//! time through [`Clock`] so tests can drive it deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use jiff::Timestamp;

/// Source of the current time
pub trait Clock: Send + Sync + std::fmt::Debug + 'static {
    /// Current UTC timestamp
    fn now(&self) -> Timestamp;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests and simulations
///
/// Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(start.as_microsecond())),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, to: Timestamp) {
        self.micros.store(to.as_microsecond(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_microsecond(self.micros.load(Ordering::SeqCst)).unwrap_or(Timestamp::UNIX_EPOCH)
    }
}

/// Add a duration to a timestamp, saturating at the representable maximum
pub fn add(ts: Timestamp, by: Duration) -> Timestamp {
    let delta = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
    let micros = ts.as_microsecond().saturating_add(delta);
    Timestamp::from_microsecond(micros).unwrap_or(Timestamp::MAX)
}

/// Time elapsed from `earlier` to `later`, zero if `later` is not after `earlier`
pub fn elapsed(earlier: Timestamp, later: Timestamp) -> Duration {
    let micros = later.as_microsecond().saturating_sub(earlier.as_microsecond());
    u64::try_from(micros).map_or(Duration::ZERO, Duration::from_micros)
}

/// Milliseconds since the Unix epoch
pub fn unix_millis(ts: Timestamp) -> i64 {
    ts.as_millisecond()
}
