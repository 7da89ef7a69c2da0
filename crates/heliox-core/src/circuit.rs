//! Degraded-mode switch for shared backing stores
//!
//! Each store that talks to the shared backend (counters, cache, block
//! rules) owns a [`BackendCircuit`]. After enough consecutive backend
//! failures the circuit opens and callers route to their in-process
//! fallback until a probe succeeds.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Consecutive failures before the circuit opens
pub const FAILURE_THRESHOLD: u32 = 3;

/// How long the circuit stays open before allowing a probe request
pub const RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Log target for process-level degradation
pub const DEGRADED_TARGET: &str = "heliox::degraded";

/// Circuit breaker guarding one shared backend
#[derive(Clone, Debug)]
pub struct BackendCircuit {
    state: Arc<CircuitState>,
}

#[derive(Debug)]
struct CircuitState {
    backend: &'static str,
    threshold: u32,
    recovery: Duration,
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl BackendCircuit {
    /// Create a closed circuit for the named backend
    pub fn new(backend: &'static str) -> Self {
        Self::with_limits(backend, FAILURE_THRESHOLD, RECOVERY_TIMEOUT)
    }

    /// Create a closed circuit with custom threshold and probe interval
    pub fn with_limits(backend: &'static str, threshold: u32, recovery: Duration) -> Self {
        Self {
            state: Arc::new(CircuitState {
                backend,
                threshold: threshold.max(1),
                recovery,
                failure_count: AtomicU32::new(0),
                opened_at: Mutex::new(None),
            }),
        }
    }

    /// Whether the shared backend should be tried for this call
    ///
    /// Open circuits let one call through per recovery interval as a probe.
    pub fn allows_backend(&self) -> bool {
        let mut opened_at = self.state.opened_at.lock().unwrap_or_else(|e| e.into_inner());

        match *opened_at {
            None => true,
            Some(ts) if ts.elapsed() >= self.state.recovery => {
                // restart the timer so concurrent callers keep using the fallback
                *opened_at = Some(Instant::now());
                true
            }
            Some(_) => false,
        }
    }

    /// Whether the circuit is currently open
    pub fn is_degraded(&self) -> bool {
        self.state.opened_at.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Record a successful backend call, closing the circuit
    pub fn record_success(&self) {
        self.state.failure_count.store(0, Ordering::Relaxed);
        let mut opened_at = self.state.opened_at.lock().unwrap_or_else(|e| e.into_inner());

        if opened_at.take().is_some() {
            tracing::info!(
                target: DEGRADED_TARGET,
                backend = self.state.backend,
                "shared backend recovered, leaving degraded mode"
            );
        }
    }

    /// Record a failed backend call, opening the circuit if the threshold is reached
    pub fn record_failure(&self, error: &dyn std::fmt::Display) {
        let prev = self.state.failure_count.fetch_add(1, Ordering::Relaxed);

        if prev + 1 < self.state.threshold {
            tracing::warn!(backend = self.state.backend, error = %error, "shared backend call failed");
            return;
        }

        let mut opened_at = self.state.opened_at.lock().unwrap_or_else(|e| e.into_inner());
        let was_open = opened_at.is_some();
        *opened_at = Some(Instant::now());

        if !was_open {
            tracing::error!(
                target: DEGRADED_TARGET,
                backend = self.state.backend,
                error = %error,
                "shared backend unreachable, entering degraded mode with local-only state"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(cb: &BackendCircuit) {
        for _ in 0..FAILURE_THRESHOLD {
            cb.record_failure(&"connection refused");
        }
    }

    #[test]
    fn closed_circuit_uses_backend() {
        let cb = BackendCircuit::new("redis");
        assert!(cb.allows_backend());
        assert!(!cb.is_degraded());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let cb = BackendCircuit::new("redis");

        trip(&cb);

        assert!(cb.is_degraded());
        assert!(!cb.allows_backend());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = BackendCircuit::new("redis");

        for _ in 0..FAILURE_THRESHOLD - 1 {
            cb.record_failure(&"timeout");
        }
        cb.record_success();
        cb.record_failure(&"timeout");

        assert!(cb.allows_backend());
    }

    #[test]
    fn single_probe_per_recovery_interval() {
        let cb = BackendCircuit::with_limits("redis", 1, Duration::from_millis(5));
        cb.record_failure(&"down");
        assert!(!cb.allows_backend());

        std::thread::sleep(Duration::from_millis(10));

        assert!(cb.allows_backend());
        assert!(!cb.allows_backend());
    }

    #[test]
    fn successful_probe_leaves_degraded_mode() {
        let cb = BackendCircuit::with_limits("redis", 1, Duration::ZERO);
        cb.record_failure(&"down");
        assert!(cb.is_degraded());

        assert!(cb.allows_backend());
        cb.record_success();

        assert!(!cb.is_degraded());
    }

    #[test]
    fn clone_shares_state() {
        let cb1 = BackendCircuit::new("redis");
        let cb2 = cb1.clone();

        trip(&cb1);

        assert!(cb2.is_degraded());
    }
}
