use std::time::Duration;

use url::Url;
use uuid::Uuid;

/// Which query parameters participate in the cache key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryKeyRule {
    /// Every parameter
    #[default]
    All,
    /// Every parameter except the listed names
    Ignore(Vec<String>),
    /// Only the listed names
    Only(Vec<String>),
}

impl QueryKeyRule {
    /// Whether a parameter name participates
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Ignore(names) => !names.iter().any(|n| n == name),
            Self::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Per-route cacheability rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Freshness lifetime of a stored response
    pub ttl: Duration,
    /// How long past `ttl` a stale copy may still be served
    pub stale_window: Duration,
    /// Cacheable request methods, upper-case
    pub methods: Vec<String>,
    /// Cacheable response status codes
    pub statuses: Vec<u16>,
    pub query: QueryKeyRule,
    /// Request headers folded into the key, lower-case
    pub vary_headers: Vec<String>,
    /// Larger bodies are never stored
    pub max_body_size: usize,
    /// Refresh stale entries in the background after serving them
    pub revalidate: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            stale_window: Duration::ZERO,
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            statuses: vec![200, 203, 204, 300, 301, 404, 410],
            query: QueryKeyRule::All,
            vary_headers: Vec::new(),
            max_body_size: 10 * 1024 * 1024,
            revalidate: true,
        }
    }
}

impl CachePolicy {
    pub fn caches_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn caches_status(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }
}

/// Upstream mapping owned by a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Exact host to match, any host when `None`
    pub host: Option<String>,
    /// Path prefix matched on segment boundaries
    pub path_prefix: String,
    /// Allowed methods, any method when empty
    pub methods: Vec<String>,
    pub upstream_url: Url,
    /// Remove `path_prefix` before forwarding
    pub strip_prefix: bool,
    /// Overrides the gateway default upstream timeout
    pub timeout: Option<Duration>,
    /// Caching is disabled when `None`
    pub cache_policy: Option<CachePolicy>,
    pub is_active: bool,
}
