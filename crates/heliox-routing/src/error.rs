//! Route resolution errors

use heliox_core::{GatewayError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    /// No active route of the tenant matches
    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },

    /// Route table could not be read
    #[error("route store: {0}")]
    Store(#[from] StoreError),

    /// Upstream URL could not be built from the route
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    /// Request path would resolve outside the upstream base path
    #[error("path escapes upstream base: {0}")]
    OutsideUpstream(String),
}

impl From<RouteError> for GatewayError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NotFound { method, path } => Self::RouteNotFound { method, path },
            RouteError::OutsideUpstream(path) => Self::RouteNotFound { method: String::new(), path },
            other => Self::Internal(other.to_string()),
        }
    }
}
