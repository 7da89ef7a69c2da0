use std::time::Duration;

use heliox_core::{BlockTarget, GatewayError};
use thiserror::Error;

/// Rejections from the block list and detector
#[derive(Debug, Error)]
pub enum AbuseError {
    /// A block rule is in effect for the key or client IP
    #[error("{target} is blocked: {reason}")]
    Blocked {
        target: BlockTarget,
        reason: String,
        /// Time until the rule expires
        retry_after: Duration,
    },
}

impl From<AbuseError> for GatewayError {
    fn from(err: AbuseError) -> Self {
        match err {
            AbuseError::Blocked {
                reason, retry_after, ..
            } => Self::Blocked { reason, retry_after },
        }
    }
}
