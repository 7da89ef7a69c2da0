use heliox_core::{GatewayError, StoreError};

/// Credential resolution errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Neither `X-API-Key` nor a bearer token was sent
    #[error("missing API key")]
    Missing,

    /// Unknown secret, or a key whose tenant no longer exists
    #[error("invalid API key")]
    InvalidKey,

    /// Key or owning tenant is disabled
    #[error("API key or tenant is disabled")]
    Disabled,

    #[error("key lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing | AuthError::InvalidKey => Self::Unauthorized,
            AuthError::Disabled => Self::Disabled,
            AuthError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}
