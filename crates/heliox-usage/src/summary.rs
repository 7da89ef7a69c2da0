use heliox_core::{CacheStatus, EffectiveLimits, RequestLog};
use heliox_ratelimit::percent_used;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;

/// Usage figures for a key or tenant at an instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub daily_requests: u64,
    pub monthly_requests: u64,
    pub daily_limit: u64,
    pub monthly_limit: u64,
    pub daily_percent: f64,
    pub monthly_percent: f64,
    /// Share of the trailing 24 h served from cache, fresh or stale
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    /// Share of the trailing 24 h with a classified failure
    pub error_rate: f64,
}

impl UsageSummary {
    /// Summarize outcome records already scoped to one key or tenant
    ///
    /// Daily and monthly counts use UTC calendar boundaries. Rates and
    /// latency cover the trailing 24 hours and are `0` without traffic.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_logs(records: &[RequestLog], limits: &EffectiveLimits, now: Timestamp) -> Self {
        let date = now.to_zoned(TimeZone::UTC).date();
        let day_start = start_of(date);
        let month_start = start_of(date.first_of_month());
        let trailing_start = now.checked_sub(SignedDuration::from_hours(24)).unwrap_or(Timestamp::MIN);

        let mut daily_requests = 0_u64;
        let mut monthly_requests = 0_u64;
        let mut recent = 0_u64;
        let mut cached = 0_u64;
        let mut failed = 0_u64;
        let mut latency_total = 0_u64;

        for record in records.iter().filter(|r| r.timestamp <= now) {
            if record.timestamp >= month_start {
                monthly_requests += 1;
            }
            if record.timestamp >= day_start {
                daily_requests += 1;
            }
            if record.timestamp >= trailing_start {
                recent += 1;
                latency_total = latency_total.saturating_add(record.latency_ms);
                if matches!(record.cache_status, CacheStatus::Hit | CacheStatus::Stale) {
                    cached += 1;
                }
                if !record.is_success() {
                    failed += 1;
                }
            }
        }

        let ratio = |part: u64| if recent == 0 { 0.0 } else { part as f64 / recent as f64 };

        Self {
            daily_requests,
            monthly_requests,
            daily_limit: limits.quota_daily,
            monthly_limit: limits.quota_monthly,
            daily_percent: percent_used(daily_requests, limits.quota_daily),
            monthly_percent: percent_used(monthly_requests, limits.quota_monthly),
            cache_hit_rate: ratio(cached),
            avg_latency_ms: ratio(latency_total),
            error_rate: ratio(failed),
        }
    }
}

fn start_of(date: jiff::civil::Date) -> Timestamp {
    date.to_zoned(TimeZone::UTC).map_or(Timestamp::MIN, |z| z.timestamp())
}

#[cfg(test)]
mod tests {
    use heliox_core::ErrorType;

    use super::*;

    fn limits(daily: u64, monthly: u64) -> EffectiveLimits {
        EffectiveLimits {
            quota_daily: daily,
            quota_monthly: monthly,
            rate_limit_rps: 10.0,
            rate_limit_burst: 20,
            cache_enabled: true,
        }
    }

    fn record(at: &str, latency_ms: u64, cache_status: CacheStatus, error_type: ErrorType) -> RequestLog {
        RequestLog {
            request_id: at.into(),
            tenant_id: None,
            key_id: None,
            route_id: None,
            client_ip: None,
            method: "GET".into(),
            path: "/".into(),
            timestamp: at.parse().unwrap(),
            latency_ms,
            status: 200,
            cache_status,
            error_type,
        }
    }

    #[test]
    fn counts_calendar_periods_and_trailing_rates() {
        let now: Timestamp = "2026-03-10T06:00:00Z".parse().unwrap();
        let records = vec![
            record("2026-02-28T12:00:00Z", 100, CacheStatus::Miss, ErrorType::None),
            record("2026-03-02T12:00:00Z", 100, CacheStatus::Miss, ErrorType::None),
            record("2026-03-09T12:00:00Z", 30, CacheStatus::Hit, ErrorType::None),
            record("2026-03-10T01:00:00Z", 10, CacheStatus::Stale, ErrorType::None),
            record("2026-03-10T02:00:00Z", 50, CacheStatus::Miss, ErrorType::UpstreamTimeout),
            record("2026-03-10T03:00:00Z", 10, CacheStatus::Bypass, ErrorType::None),
        ];

        let summary = UsageSummary::from_logs(&records, &limits(4, 100), now);

        assert_eq!(summary.daily_requests, 3);
        assert_eq!(summary.monthly_requests, 5);
        assert!((summary.daily_percent - 75.0).abs() < 1e-9);
        assert!((summary.monthly_percent - 5.0).abs() < 1e-9);
        assert!((summary.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!((summary.error_rate - 0.25).abs() < 1e-9);
        assert!((summary.avg_latency_ms - 25.0).abs() < 1e-9);
    }

    #[test]
    fn percentages_cap_and_unlimited_reads_zero() {
        let now: Timestamp = "2026-03-10T06:00:00Z".parse().unwrap();
        let records: Vec<_> = (0..5)
            .map(|_| record("2026-03-10T05:00:00Z", 1, CacheStatus::Miss, ErrorType::None))
            .collect();

        let capped = UsageSummary::from_logs(&records, &limits(2, 0), now);

        assert!((capped.daily_percent - 100.0).abs() < f64::EPSILON);
        assert!(capped.monthly_percent.abs() < f64::EPSILON);
    }

    #[test]
    fn empty_history_is_all_zero() {
        let summary = UsageSummary::from_logs(&[], &limits(10, 10), Timestamp::UNIX_EPOCH);

        assert_eq!(summary.daily_requests, 0);
        assert!(summary.avg_latency_ms.abs() < f64::EPSILON);
        assert!(summary.cache_hit_rate.abs() < f64::EPSILON);
    }
}
