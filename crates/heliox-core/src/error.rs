use std::time::Duration;

use http::StatusCode;

use crate::outcome::ErrorType;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each pipeline crate's error type. The server layer
/// converts these into actual HTTP responses, keeping domain errors
/// decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `rate_limited`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;

    /// Seconds the client should wait before retrying, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Quota period that was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QuotaPeriod {
    Daily,
    Monthly,
}

/// Cause of an upstream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UpstreamFailure {
    /// No response within the route's timeout
    Timeout,
    /// Connection refused or reset before a response arrived
    Connection,
    /// Malformed or unreadable upstream response
    Protocol,
}

/// Terminal failure of the admission and forwarding pipeline
///
/// Every variant ends the request. Cache store failures are not represented
/// here because they never abort a request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing or unknown credential
    #[error("invalid or missing API key")]
    Unauthorized,

    /// Key or tenant is disabled
    #[error("API key is disabled")]
    Disabled,

    /// No route matches the request
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Token bucket is empty
    #[error("rate limit exceeded, retry after {:.3}s", retry_after.as_secs_f64())]
    RateLimited { retry_after: Duration },

    /// Daily or monthly quota exhausted
    #[error("{period} quota exceeded")]
    QuotaExceeded { period: QuotaPeriod, retry_after: Duration },

    /// Identifier is on the block list
    #[error("blocked: {reason}")]
    Blocked { reason: String, retry_after: Duration },

    /// Upstream call failed
    #[error("upstream {kind}: {message}")]
    Upstream { kind: UpstreamFailure, message: String },

    /// Request body exceeds the configured limit
    #[error("request body too large")]
    PayloadTooLarge,

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Classification recorded in the outcome log
    pub const fn outcome_type(&self) -> ErrorType {
        match self {
            Self::Unauthorized => ErrorType::Unauthorized,
            Self::Disabled => ErrorType::Disabled,
            Self::RouteNotFound { .. } => ErrorType::RouteNotFound,
            Self::RateLimited { .. } => ErrorType::RateLimited,
            Self::QuotaExceeded { .. } => ErrorType::QuotaExceeded,
            Self::Blocked { .. } => ErrorType::Blocked,
            Self::Upstream { kind, .. } => match kind {
                UpstreamFailure::Timeout => ErrorType::UpstreamTimeout,
                UpstreamFailure::Connection => ErrorType::UpstreamConnection,
                UpstreamFailure::Protocol => ErrorType::UpstreamProtocol,
            },
            Self::PayloadTooLarge => ErrorType::PayloadTooLarge,
            Self::Internal(_) => ErrorType::Internal,
        }
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Disabled | Self::Blocked { .. } => StatusCode::FORBIDDEN,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } | Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream {
                kind: UpstreamFailure::Timeout,
                ..
            } => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        self.outcome_type().as_str()
    }

    fn client_message(&self) -> String {
        match self {
            Self::Upstream { kind, .. } => format!("upstream {kind}"),
            Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after }
            | Self::QuotaExceeded { retry_after, .. }
            | Self::Blocked { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_and_rate_limit_share_status_but_not_type() {
        let rate = GatewayError::RateLimited {
            retry_after: Duration::from_millis(100),
        };
        let quota = GatewayError::QuotaExceeded {
            period: QuotaPeriod::Daily,
            retry_after: Duration::from_secs(60),
        };

        assert_eq!(rate.status_code(), quota.status_code());
        assert_ne!(rate.error_type(), quota.error_type());
        assert_eq!(quota.error_type(), "quota_exceeded");
    }

    #[test]
    fn upstream_timeout_is_gateway_timeout() {
        let err = GatewayError::Upstream {
            kind: UpstreamFailure::Timeout,
            message: "deadline".into(),
        };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_type(), "upstream_timeout");

        let err = GatewayError::Upstream {
            kind: UpstreamFailure::Connection,
            message: "refused".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_details_are_hidden_from_clients() {
        let err = GatewayError::Internal("redis pool exhausted".into());
        assert_eq!(err.client_message(), "internal server error");
        assert!(err.retry_after().is_none());
    }
}
