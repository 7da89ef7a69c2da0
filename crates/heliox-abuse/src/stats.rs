//! Per-identifier rolling statistics
//!
//! Requests are counted in fixed evaluation windows. When a window closes,
//! its rate feeds a short-term EWMA, is scored against the trailing mean and
//! variance of that EWMA series, and the identifier's anomaly streak is
//! updated. Anomalous windows never move the trailing baseline.

use std::time::Duration;

use heliox_config::AbuseConfig;
use heliox_core::clock;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Empty windows folded in at most when an identifier returns after a gap
pub const MAX_IDLE_WINDOWS: u32 = 16;

/// Detector tuning derived from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    pub alpha: f64,
    pub threshold: f64,
    pub consecutive: u32,
    pub window: Duration,
    pub warmup: u32,
    pub min_stddev: f64,
    pub max_error_ratio: f64,
    pub min_error_samples: u64,
}

impl From<&AbuseConfig> for DetectorParams {
    fn from(config: &AbuseConfig) -> Self {
        Self {
            alpha: config.ewma_alpha,
            threshold: config.zscore_threshold,
            consecutive: config.consecutive_windows.max(1),
            window: config.window,
            warmup: config.warmup_windows,
            min_stddev: config.min_stddev,
            max_error_ratio: config.max_error_ratio,
            min_error_samples: config.min_error_samples,
        }
    }
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self::from(&AbuseConfig::default())
    }
}

/// What closing one or more windows concluded
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Evaluation {
    /// Z-score of the last scored window
    pub z: Option<f64>,
    /// Consecutive anomalous windows so far
    pub streak: u32,
    /// Streak reached the configured length
    pub flagged: bool,
}

/// Rolling state for one identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStats {
    pub window_start: Timestamp,
    pub count: u64,
    pub errors: u64,
    pub ewma_rate: f64,
    pub ewma_error: f64,
    pub mean: f64,
    pub variance: f64,
    pub windows: u32,
    pub streak: u32,
}

impl RateStats {
    pub const fn new(now: Timestamp) -> Self {
        Self {
            window_start: now,
            count: 0,
            errors: 0,
            ewma_rate: 0.0,
            ewma_error: 0.0,
            mean: 0.0,
            variance: 0.0,
            windows: 0,
            streak: 0,
        }
    }

    /// Count one admitted request, closing any finished windows first
    pub fn record_request(&mut self, now: Timestamp, params: &DetectorParams) -> Evaluation {
        let evaluation = self.advance(now, params);
        self.count += 1;
        evaluation
    }

    /// Count one failed request in the current window
    pub fn record_error(&mut self, now: Timestamp, params: &DetectorParams) -> Evaluation {
        let evaluation = self.advance(now, params);
        self.errors += 1;
        evaluation
    }

    /// Close every window that ended before `now`
    pub fn advance(&mut self, now: Timestamp, params: &DetectorParams) -> Evaluation {
        let mut evaluation = Evaluation {
            z: None,
            streak: self.streak,
            flagged: self.streak >= params.consecutive,
        };

        let window_us = i64::try_from(params.window.as_micros()).unwrap_or(i64::MAX).max(1);
        let elapsed_us = now.as_microsecond() - self.window_start.as_microsecond();
        if elapsed_us < window_us {
            return evaluation;
        }

        let finished = elapsed_us / window_us;
        self.close_window(params, &mut evaluation);

        let idle = u32::try_from(finished - 1).unwrap_or(u32::MAX).min(MAX_IDLE_WINDOWS);
        for _ in 0..idle {
            self.close_window(params, &mut evaluation);
        }

        let skipped = Duration::from_micros(u64::try_from(finished * window_us).unwrap_or(u64::MAX));
        self.window_start = clock::add(self.window_start, skipped);
        evaluation
    }

    fn close_window(&mut self, params: &DetectorParams, evaluation: &mut Evaluation) {
        #[allow(clippy::cast_precision_loss)]
        let sample = self.count as f64 / params.window.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let error_sample = if self.count > 0 {
            (self.errors as f64 / self.count as f64).min(1.0)
        } else {
            0.0
        };

        if self.windows == 0 {
            self.ewma_rate = sample;
            self.ewma_error = error_sample;
            self.mean = sample;
        } else {
            self.ewma_rate = params.alpha.mul_add(sample, (1.0 - params.alpha) * self.ewma_rate);
            if self.count > 0 {
                self.ewma_error = params.alpha.mul_add(error_sample, (1.0 - params.alpha) * self.ewma_error);
            }
        }
        self.windows = self.windows.saturating_add(1);

        let mut anomalous = false;
        if self.windows > params.warmup {
            let stddev = self.variance.sqrt().max(params.min_stddev);
            let z = (sample - self.mean) / stddev;
            let error_burst = self.count >= params.min_error_samples && self.ewma_error > params.max_error_ratio;

            anomalous = z > params.threshold || error_burst;
            evaluation.z = Some(z);
        }

        if anomalous {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.streak = 0;
            let diff = self.ewma_rate - self.mean;
            self.mean += params.alpha * diff;
            self.variance = (1.0 - params.alpha) * params.alpha.mul_add(diff * diff, self.variance);
        }

        evaluation.streak = self.streak;
        evaluation.flagged = self.streak >= params.consecutive;

        self.count = 0;
        self.errors = 0;
    }

    /// Clear the anomaly streak after a block has been issued
    pub fn reset_streak(&mut self) {
        self.streak = 0;
    }

    /// Whether the state carries nothing worth keeping
    pub fn is_stale(&self, now: Timestamp, params: &DetectorParams) -> bool {
        clock::elapsed(self.window_start, now) >= params.window * (MAX_IDLE_WINDOWS + 1)
    }
}
