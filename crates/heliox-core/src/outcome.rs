use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the cache layer handled a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheStatus {
    /// Fresh entry served without contacting upstream
    Hit,
    /// Expired entry served inside the stale window
    Stale,
    /// No entry, response fetched from upstream
    Miss,
    /// Cache not consulted or response not storable
    Bypass,
}

impl CacheStatus {
    /// Header value form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Stale => "stale",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }

    /// Served from cache (fresh or stale)
    pub const fn is_cached(self) -> bool {
        matches!(self, Self::Hit | Self::Stale)
    }
}

/// Classified failure recorded for a request, `none` on success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorType {
    None,
    Unauthorized,
    Disabled,
    RouteNotFound,
    RateLimited,
    QuotaExceeded,
    Blocked,
    UpstreamTimeout,
    UpstreamConnection,
    UpstreamProtocol,
    PayloadTooLarge,
    ClientDisconnect,
    Internal,
}

impl ErrorType {
    /// Wire form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unauthorized => "unauthorized",
            Self::Disabled => "disabled",
            Self::RouteNotFound => "route_not_found",
            Self::RateLimited => "rate_limited",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Blocked => "blocked",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamConnection => "upstream_connection",
            Self::UpstreamProtocol => "upstream_protocol",
            Self::PayloadTooLarge => "payload_too_large",
            Self::ClientDisconnect => "client_disconnect",
            Self::Internal => "internal",
        }
    }
}

/// Append-only record of one request through the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    pub request_id: String,
    pub tenant_id: Option<Uuid>,
    pub key_id: Option<Uuid>,
    pub route_id: Option<Uuid>,
    pub client_ip: Option<String>,
    pub method: String,
    pub path: String,
    pub timestamp: Timestamp,
    pub latency_ms: u64,
    pub status: u16,
    pub cache_status: CacheStatus,
    pub error_type: ErrorType,
}

impl RequestLog {
    /// Whether the request completed without a classified failure
    pub fn is_success(&self) -> bool {
        self.error_type == ErrorType::None
    }
}
