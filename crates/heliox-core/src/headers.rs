use std::sync::OnceLock;

use http::header::{self, HeaderMap, HeaderName};

/// Request id added to every response
pub const REQUEST_ID: &str = "x-request-id";

/// Cache status indicator added to proxied responses
pub const CACHE_STATUS: &str = "x-cache-status";

/// Primary credential header
pub const API_KEY: &str = "x-api-key";

/// Headers that must never cross the gateway in either direction
static DENY_LIST: OnceLock<[HeaderName; 11]> = OnceLock::new();

/// Get the header deny list
pub fn get_deny_list() -> &'static [HeaderName] {
    DENY_LIST.get_or_init(|| {
        [
            header::CONNECTION,
            HeaderName::from_static("keep-alive"),
            header::PROXY_AUTHENTICATE,
            header::PROXY_AUTHORIZATION,
            header::TE,
            header::TRAILER,
            header::TRANSFER_ENCODING,
            header::UPGRADE,
            header::HOST,
            header::CONTENT_LENGTH,
            HeaderName::from_static(API_KEY),
        ]
    })
}

/// Check if a header name is in the deny list
pub fn is_header_denied(name: &HeaderName) -> bool {
    get_deny_list().contains(name)
}

/// Copy headers that may be forwarded upstream
///
/// Drops hop-by-hop headers and the gateway credential. `Authorization` is
/// only dropped when it carried the gateway key as a bearer token.
pub fn forwardable_request_headers(incoming: &HeaderMap, bearer_was_credential: bool) -> HeaderMap {
    let mut result = HeaderMap::with_capacity(incoming.len());

    for (name, value) in incoming {
        if is_header_denied(name) {
            continue;
        }
        if bearer_was_credential && name == header::AUTHORIZATION {
            continue;
        }
        result.append(name.clone(), value.clone());
    }

    result
}

/// Copy upstream response headers that may be returned to the client
///
/// The upstream's request id is dropped; the gateway stamps its own.
pub fn forwardable_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut result = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream {
        if is_header_denied(name) || name == REQUEST_ID {
            continue;
        }
        result.append(name.clone(), value.clone());
    }

    result
}
