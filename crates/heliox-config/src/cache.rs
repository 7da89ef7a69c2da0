use std::time::Duration;

use serde::Deserialize;

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Master switch, plans and routes can only narrow it
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Memory budget for the in-process store, in bytes
    #[serde(default = "default_max_memory")]
    pub max_memory: u64,
    /// Upper bound on how long any entry is retained
    #[serde(default = "default_max_entry_age", deserialize_with = "crate::duration::deserialize")]
    pub max_entry_age: Duration,
    /// Policy values for routes that enable caching without overriding them
    #[serde(default)]
    pub defaults: CacheDefaults,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory: default_max_memory(),
            max_entry_age: default_max_entry_age(),
            defaults: CacheDefaults::default(),
        }
    }
}

/// Default per-route cache policy
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDefaults {
    #[serde(default = "default_ttl", deserialize_with = "crate::duration::deserialize")]
    pub ttl: Duration,
    /// Serve expired entries this long past `ttl`
    #[serde(default, deserialize_with = "crate::duration::deserialize")]
    pub stale_window: Duration,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
    #[serde(default = "default_statuses")]
    pub statuses: Vec<u16>,
    #[serde(default = "default_enabled")]
    pub revalidate: bool,
}

impl Default for CacheDefaults {
    fn default() -> Self {
        Self {
            ttl: default_ttl(),
            stale_window: Duration::ZERO,
            methods: default_methods(),
            statuses: default_statuses(),
            revalidate: true,
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_enabled() -> bool {
    true
}

const fn default_max_memory() -> u64 {
    64 * 1024 * 1024
}

const fn default_max_entry_age() -> Duration {
    Duration::from_secs(3600)
}

const fn default_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_owned(), "HEAD".to_owned()]
}

fn default_statuses() -> Vec<u16> {
    vec![200, 203, 204, 300, 301, 404, 410]
}
