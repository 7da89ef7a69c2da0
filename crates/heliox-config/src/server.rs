use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub client_ip: ClientIpConfig,
    /// Largest request body accepted, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Per-client-IP flood guard applied before credential resolution
    #[serde(default)]
    pub edge_guard: Option<EdgeGuardConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            health: HealthConfig::default(),
            client_ip: ClientIpConfig::default(),
            max_body_size: default_max_body_size(),
            edge_guard: None,
        }
    }
}

/// Liveness route answered outside the admission pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_owned(),
        }
    }
}

/// Which address counts as the client's
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientIpConfig {
    /// Proxies in front of the gateway that append to `X-Forwarded-For`
    ///
    /// Unset or `0` uses the socket peer and ignores the header.
    #[serde(default)]
    pub trusted_hops: Option<usize>,
}

/// Request allowance per client IP
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeGuardConfig {
    /// Maximum requests per window
    pub requests: u32,
    /// Window duration (e.g. "1s", "1m")
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub window: Duration,
}

const fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}
