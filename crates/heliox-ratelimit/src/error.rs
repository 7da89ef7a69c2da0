use std::time::Duration;

use heliox_core::{GatewayError, QuotaPeriod};
use thiserror::Error;

/// Admission rejections from the rate and quota gates
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Token bucket empty
    #[error("rate limit exceeded")]
    Exceeded {
        /// Time until one token is available
        retry_after: Duration,
    },

    /// Daily or monthly quota exhausted
    #[error("{period} quota exceeded")]
    QuotaExceeded {
        period: QuotaPeriod,
        /// Time until the period resets
        retry_after: Duration,
    },
}

impl From<RateLimitError> for GatewayError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded { retry_after } => Self::RateLimited { retry_after },
            RateLimitError::QuotaExceeded { period, retry_after } => Self::QuotaExceeded { period, retry_after },
            RateLimitError::Config(message) => Self::Internal(message),
        }
    }
}
