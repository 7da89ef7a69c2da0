use std::time::Duration;

use bytes::Bytes;
use heliox_core::{CachePolicy, clock};
use http::{HeaderMap, HeaderName, HeaderValue};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Freshness of a stored response at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Stored upstream response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(with = "base64_body")]
    pub body: Bytes,
    pub stored_at: Timestamp,
    pub fresh_until: Timestamp,
    pub stale_until: Timestamp,
}

impl CachedResponse {
    /// Capture a response under `policy`, stored at `now`
    ///
    /// Headers that are not valid UTF-8 are dropped.
    pub fn new(status: u16, headers: &HeaderMap, body: Bytes, policy: &CachePolicy, now: Timestamp) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let fresh_until = clock::add(now, policy.ttl);

        Self {
            status,
            headers,
            body,
            stored_at: now,
            fresh_until,
            stale_until: clock::add(fresh_until, policy.stale_window),
        }
    }

    pub fn freshness(&self, now: Timestamp) -> Freshness {
        if now < self.fresh_until {
            Freshness::Fresh
        } else if now < self.stale_until {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Time since the response was stored, for the `Age` header
    pub fn age(&self, now: Timestamp) -> Duration {
        clock::elapsed(self.stored_at, now)
    }

    /// Time left before the entry can no longer be served
    pub fn retention(&self, now: Timestamp) -> Duration {
        clock::elapsed(now, self.stale_until)
    }

    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                map.append(name, value);
            }
        }
        map
    }

    /// Approximate memory footprint, used to weigh in-process entries
    pub fn weight(&self) -> usize {
        self.body.len()
            + self
                .headers
                .iter()
                .map(|(name, value)| name.len() + value.len())
                .sum::<usize>()
            + 64
    }
}

mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
