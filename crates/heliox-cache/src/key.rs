//! Deterministic cache keys
//!
//! Every dimension is length-prefixed and absent dimensions are written
//! as explicit markers, so two different requests can never serialize to
//! the same byte stream.

use heliox_core::CachePolicy;
use http::HeaderMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Collapse repeated slashes and drop a trailing slash, keeping `/` for the root
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    normalized.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if normalized.len() > 1 {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    normalized
}

/// Query parameters selected by the policy, sorted by name then value
fn selected_query(query: Option<&str>, policy: &CachePolicy) -> Vec<(String, String)> {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Vec::new();
    };

    let mut params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| policy.query.includes(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    params.sort();
    params
}

fn part(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Hex SHA-256 over route, method, path, selected query and selected headers
pub fn cache_key(
    route_id: Uuid,
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    policy: &CachePolicy,
) -> String {
    let mut hasher = Sha256::new();

    part(&mut hasher, route_id.as_bytes());
    part(&mut hasher, method.to_ascii_uppercase().as_bytes());
    part(&mut hasher, normalize_path(path).as_bytes());

    let params = selected_query(query, policy);
    if params.is_empty() {
        part(&mut hasher, b"query:none");
    } else {
        part(&mut hasher, b"query");
        hasher.update((params.len() as u64).to_le_bytes());
        for (name, value) in &params {
            part(&mut hasher, name.as_bytes());
            part(&mut hasher, value.as_bytes());
        }
    }

    let mut names: Vec<String> = policy.vary_headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();
    part(&mut hasher, b"headers");
    hasher.update((names.len() as u64).to_le_bytes());
    for name in &names {
        part(&mut hasher, name.as_bytes());
        let values: Vec<&[u8]> = headers.get_all(name.as_str()).iter().map(http::HeaderValue::as_bytes).collect();
        if values.is_empty() {
            part(&mut hasher, b"header:none");
        } else {
            part(&mut hasher, &values.join(&b","[..]));
        }
    }

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use heliox_core::QueryKeyRule;
    use http::HeaderValue;

    use super::*;

    fn key(path: &str, query: Option<&str>, headers: &HeaderMap, policy: &CachePolicy) -> String {
        cache_key(Uuid::nil(), "GET", path, query, headers, policy)
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("//v1///users/"), "/v1/users");
        assert_eq!(normalize_path("/v1/users"), "/v1/users");
    }

    #[test]
    fn equivalent_requests_share_a_key() {
        let policy = CachePolicy::default();
        let headers = HeaderMap::new();

        assert_eq!(
            key("/v1/users/", Some("b=2&a=1"), &headers, &policy),
            key("/v1//users", Some("a=1&b=2"), &headers, &policy),
        );
        assert_eq!(
            cache_key(Uuid::nil(), "get", "/x", None, &headers, &policy),
            cache_key(Uuid::nil(), "GET", "/x", Some(""), &headers, &policy),
        );
    }

    #[test]
    fn every_dimension_changes_the_key() {
        let policy = CachePolicy {
            vary_headers: vec!["Accept-Language".into()],
            ..CachePolicy::default()
        };
        let empty = HeaderMap::new();
        let base = key("/v1/users", Some("page=1"), &empty, &policy);

        assert_ne!(base, cache_key(Uuid::now_v7(), "GET", "/v1/users", Some("page=1"), &empty, &policy));
        assert_ne!(base, cache_key(Uuid::nil(), "HEAD", "/v1/users", Some("page=1"), &empty, &policy));
        assert_ne!(base, key("/v1/user", Some("page=1"), &empty, &policy));
        assert_ne!(base, key("/v1/users", Some("page=2"), &empty, &policy));
        assert_ne!(base, key("/v1/users", None, &empty, &policy));

        let mut german = HeaderMap::new();
        german.insert("accept-language", HeaderValue::from_static("de"));
        assert_ne!(base, key("/v1/users", Some("page=1"), &german, &policy));
    }

    #[test]
    fn unselected_dimensions_are_ignored() {
        let policy = CachePolicy {
            query: QueryKeyRule::Ignore(vec!["utm_source".into()]),
            ..CachePolicy::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("accept-language", HeaderValue::from_static("de"));

        assert_eq!(
            key("/p", Some("id=7&utm_source=mail"), &headers, &policy),
            key("/p", Some("id=7"), &HeaderMap::new(), &policy),
        );
    }

    #[test]
    fn repeated_query_names_sort_by_value() {
        let policy = CachePolicy::default();
        let headers = HeaderMap::new();

        assert_eq!(
            key("/p", Some("tag=b&tag=a"), &headers, &policy),
            key("/p", Some("tag=a&tag=b"), &headers, &policy),
        );
    }
}
