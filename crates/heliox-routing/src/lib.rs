//! Route matching
//!
//! Maps a tenant's request (method, host, path) to the most specific of its
//! routes and builds the upstream URL for it.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod matcher;

pub use error::RouteError;
pub use matcher::{RouteMatcher, best_match, has_dot_segment, prefix_matches, upstream_url};
