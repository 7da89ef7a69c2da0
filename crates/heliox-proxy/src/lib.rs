//! Proxy executor
//!
//! Sends admitted, cache-missed requests to the route upstream with a
//! bounded timeout and classifies failures as timeout, connection or
//! protocol errors.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod executor;

pub use error::UpstreamError;
pub use executor::{ForwardRequest, ProxyExecutor, UpstreamResponse};
