use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use http::request::Parts;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Client address for a request
///
/// With `trusted_hops` set, the address is taken from `X-Forwarded-For`,
/// counting that many entries in from the right. Otherwise, or when the
/// header is missing or malformed, the peer address is used.
pub fn client_ip(parts: &Parts, trusted_hops: Option<usize>) -> Option<IpAddr> {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let Some(hops) = trusted_hops.filter(|h| *h > 0) else {
        return peer;
    };

    let forwarded: Vec<&str> = parts
        .headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    forwarded
        .len()
        .checked_sub(hops)
        .and_then(|index| forwarded[index].parse().ok())
        .or(peer)
}

#[cfg(test)]
mod tests {
    use http::Request;

    use super::*;

    fn parts(forwarded: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));
        parts
    }

    #[test]
    fn untrusted_header_is_ignored() {
        let ip = client_ip(&parts(Some("203.0.113.7")), None);
        assert_eq!(ip, Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn counts_trusted_hops_from_the_right() {
        let parts = parts(Some("198.51.100.1, 203.0.113.7, 10.0.0.2"));

        assert_eq!(client_ip(&parts, Some(1)), Some("10.0.0.2".parse().unwrap()));
        assert_eq!(client_ip(&parts, Some(2)), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn short_or_garbled_chain_falls_back_to_peer() {
        assert_eq!(client_ip(&parts(Some("203.0.113.7")), Some(2)), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(client_ip(&parts(Some("not-an-ip")), Some(1)), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(client_ip(&parts(None), Some(1)), Some("10.0.0.1".parse().unwrap()));
    }
}
