use serde::Deserialize;
use url::Url;

/// Shared state backend for counters, cached responses and block rules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-process state (single instance only)
    #[default]
    Memory,
    /// Redis-backed state shared by every gateway instance
    Redis(RedisConfig),
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: Url,
    /// Prefix for every key written by the gateway
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_key_prefix() -> String {
    "heliox".to_owned()
}

const fn default_command_timeout_ms() -> u64 {
    250
}
