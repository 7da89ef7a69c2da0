use heliox_core::BackendError;
use thiserror::Error;

/// Cache store failures
///
/// Never fatal to a request: lookups degrade to a miss and stores are
/// skipped.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend: {0}")]
    Backend(#[from] BackendError),

    #[error("serialization: {0}")]
    Serialization(String),
}
