use std::time::Duration;

use heliox_core::{GatewayError, UpstreamFailure};
use thiserror::Error;

/// Upstream call failures, classified by cause
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No complete response within the timeout
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused, reset or DNS failure
    #[error("upstream connection failed: {0}")]
    Connection(String),

    /// Upstream answered with something unreadable
    #[error("upstream protocol error: {0}")]
    Protocol(String),

    /// HTTP client could not be constructed
    #[error("upstream client: {0}")]
    Client(String),
}

impl UpstreamError {
    pub const fn kind(&self) -> UpstreamFailure {
        match self {
            Self::Timeout(_) => UpstreamFailure::Timeout,
            Self::Connection(_) => UpstreamFailure::Connection,
            Self::Protocol(_) | Self::Client(_) => UpstreamFailure::Protocol,
        }
    }

    /// Classify a transport error from the HTTP client
    pub fn classify(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_body() || err.is_decode() || err.is_redirect() {
            Self::Protocol(err.to_string())
        } else if err.is_request() {
            // reset before any response bytes
            Self::Connection(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Client(message) => Self::Internal(message),
            other => Self::Upstream {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}
