use std::time::Duration;

use heliox_core::clock;
use jiff::tz::TimeZone;
use jiff::{Timestamp, ToSpan};

/// UTC day and month a request falls in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWindow {
    /// `YYYYMMDD`
    pub day: String,
    /// `YYYYMM`
    pub month: String,
    /// Next UTC midnight
    pub day_reset: Timestamp,
    /// Midnight UTC on the 1st of next month
    pub month_reset: Timestamp,
}

impl QuotaWindow {
    pub fn at(now: Timestamp) -> Self {
        let date = now.to_zoned(TimeZone::UTC).date();
        let tomorrow = date.tomorrow().unwrap_or(date);
        let next_month = date
            .first_of_month()
            .checked_add(1.month())
            .unwrap_or_else(|_| date.last_of_month());

        Self {
            day: date.strftime("%Y%m%d").to_string(),
            month: date.strftime("%Y%m").to_string(),
            day_reset: midnight_utc(tomorrow),
            month_reset: midnight_utc(next_month),
        }
    }

    pub fn until_day_reset(&self, now: Timestamp) -> Duration {
        clock::elapsed(now, self.day_reset)
    }

    pub fn until_month_reset(&self, now: Timestamp) -> Duration {
        clock::elapsed(now, self.month_reset)
    }
}

fn midnight_utc(date: jiff::civil::Date) -> Timestamp {
    date.to_zoned(TimeZone::UTC).map_or(Timestamp::MAX, |z| z.timestamp())
}
