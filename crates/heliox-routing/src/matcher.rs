use std::sync::Arc;

use heliox_core::{Route, RouteStore};
use url::Url;
use uuid::Uuid;

use crate::error::RouteError;

/// Prefix without a trailing slash, `/` for the root
fn trim_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Whether `path` lies under `prefix` on a segment boundary
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = trim_prefix(prefix);
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Whether `path` holds a `.` or `..` segment, plain or percent-encoded
///
/// Encoded and back slashes count as separators since upstreams may decode
/// them before resolving the path.
pub fn has_dot_segment(path: &str) -> bool {
    let normalized = path
        .to_ascii_lowercase()
        .replace("%2f", "/")
        .replace("%5c", "/")
        .replace('\\', "/")
        .replace("%2e", ".");
    normalized.split('/').any(|segment| segment == "." || segment == "..")
}

/// Host without port, lower-cased
fn bare_host(host: &str) -> String {
    let host = if host.starts_with('[') {
        host.find(']').map_or(host, |end| &host[..=end])
    } else {
        host.rsplit_once(':').map_or(host, |(h, _)| h)
    };
    host.to_ascii_lowercase()
}

/// How specific a matching route is; higher wins
fn specificity(route: &Route) -> (usize, bool, bool) {
    (
        trim_prefix(&route.path_prefix).len(),
        route.host.is_some(),
        !route.methods.is_empty(),
    )
}

fn accepts(route: &Route, method: &str, host: Option<&str>, path: &str) -> bool {
    if !route.is_active || !prefix_matches(&route.path_prefix, path) {
        return false;
    }
    if !route.methods.is_empty() && !route.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
        return false;
    }
    match (&route.host, host) {
        (None, _) => true,
        (Some(expected), Some(actual)) => bare_host(expected) == bare_host(actual),
        (Some(_), None) => false,
    }
}

/// Most specific route accepting the request
///
/// Longest path prefix wins, then a host-bound route over a wildcard, then
/// a method-restricted route over an open one. Remaining ties go to the
/// earliest registered route. Paths with dot segments match nothing.
pub fn best_match<'a>(routes: &'a [Route], method: &str, host: Option<&str>, path: &str) -> Option<&'a Route> {
    if has_dot_segment(path) {
        return None;
    }
    let mut best: Option<&Route> = None;
    for route in routes.iter().filter(|r| accepts(r, method, host, path)) {
        if best.is_none_or(|current| specificity(route) > specificity(current)) {
            best = Some(route);
        }
    }
    best
}

/// Upstream URL for `path` under `route`
///
/// With `strip_prefix` the matched prefix is removed first. The remainder
/// is appended to the upstream base path and the query is carried over.
/// The result never leaves the upstream base path.
pub fn upstream_url(route: &Route, path: &str, query: Option<&str>) -> Result<Url, RouteError> {
    if has_dot_segment(path) {
        return Err(RouteError::OutsideUpstream(path.to_string()));
    }
    let remainder = if route.strip_prefix {
        let prefix = trim_prefix(&route.path_prefix);
        if prefix == "/" { path } else { path.strip_prefix(prefix).unwrap_or(path) }
    } else {
        path
    };

    let base = route.upstream_url.path().trim_end_matches('/');
    let joined = match remainder.trim_start_matches('/') {
        "" if base.is_empty() => "/".to_string(),
        "" => base.to_string(),
        rest => format!("{base}/{rest}"),
    };

    let mut url = route.upstream_url.clone();
    url.set_path(&joined);
    url.set_query(query.filter(|q| !q.is_empty()));
    if url.cannot_be_a_base() {
        return Err(RouteError::InvalidTarget(route.upstream_url.to_string()));
    }
    let within = url
        .path()
        .strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
    if !base.is_empty() && !within {
        return Err(RouteError::OutsideUpstream(path.to_string()));
    }
    Ok(url)
}

/// Resolves a tenant's request to one of its routes
pub struct RouteMatcher {
    store: Arc<dyn RouteStore>,
}

impl RouteMatcher {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        method: &str,
        host: Option<&str>,
        path: &str,
    ) -> Result<Route, RouteError> {
        let routes = self.store.routes_for_tenant(tenant_id).await?;

        let route = best_match(&routes, method, host, path).ok_or_else(|| RouteError::NotFound {
            method: method.to_string(),
            path: path.to_string(),
        })?;

        tracing::debug!(%tenant_id, route = %route.name, prefix = %route.path_prefix, "route matched");
        Ok(route.clone())
    }
}

impl std::fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatcher").finish_non_exhaustive()
    }
}
