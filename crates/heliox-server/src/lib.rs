//! Heliox HTTP server
//!
//! Wires the pipeline crates into an axum router: a health route and a
//! fallback handler that admits, caches and forwards every other request.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod bootstrap;
mod client_ip;
mod error;
mod health;
mod keys;
mod maintenance;
mod outcome;
mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use axum::routing::get;
use heliox_abuse::{AbuseDetector, BlockNotifier};
use heliox_auth::CredentialResolver;
use heliox_cache::ResponseCache;
use heliox_config::{Config, StorageConfig};
use heliox_core::headers::REQUEST_ID;
use heliox_core::{
    KeyStore, MemoryCatalog, PlanStore, RequestLogSink, RouteStore, SharedBackend, SharedClock, SystemClock,
    TenantStore,
};
use heliox_proxy::ProxyExecutor;
use heliox_ratelimit::{CounterStore, EdgeGuard, QuotaAccountant, RateLimiter};
use heliox_routing::RouteMatcher;
use heliox_usage::{HttpRequestLogSink, OutcomeRecorder, RecorderSettings};
use http::{HeaderName, HeaderValue};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub use bootstrap::{build_catalog, default_limits};
pub use error::{error_response, retry_after_secs};
pub use keys::KeyAdmin;

use crate::pipeline::Gateway;

/// Timeout for posting outcome batches to an HTTP sink
const SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Assembled gateway with its background workers
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    catalog: Arc<MemoryCatalog>,
    keys: KeyAdmin,
    abuse: Option<Arc<AbuseDetector>>,
    background: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Build the server from configuration
    ///
    /// Spawns the outcome recorder, block-filter refresh and maintenance
    /// tasks, so it must run inside a Tokio runtime.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the server with an explicit clock
    #[allow(clippy::too_many_lines)]
    pub fn with_clock(config: &Config, clock: SharedClock) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

        let backend = match &config.storage {
            StorageConfig::Memory => None,
            StorageConfig::Redis(redis) => {
                let backend = SharedBackend::new(
                    redis.url.as_str(),
                    &redis.key_prefix,
                    Duration::from_millis(redis.command_timeout_ms),
                )
                .map_err(|e| anyhow::anyhow!("invalid redis storage: {e}"))?;
                tracing::info!(key_prefix = %redis.key_prefix, "using redis for shared state");
                Some(backend)
            }
        };

        let catalog = Arc::new(build_catalog(config, clock.now())?);
        let background = CancellationToken::new();
        let mut tasks = Vec::new();

        let keys: Arc<dyn KeyStore> = catalog.clone();
        let tenants: Arc<dyn TenantStore> = catalog.clone();
        let plans: Arc<dyn PlanStore> = catalog.clone();
        let routes: Arc<dyn RouteStore> = catalog.clone();

        let sink: Arc<dyn RequestLogSink> = match &config.analytics.endpoint {
            Some(endpoint) => Arc::new(
                HttpRequestLogSink::new(endpoint.clone(), SINK_TIMEOUT)
                    .map_err(|e| anyhow::anyhow!("failed to build analytics sink: {e}"))?,
            ),
            None => catalog.clone(),
        };
        let (recorder, recorder_task) = OutcomeRecorder::spawn(
            RecorderSettings::from(&config.analytics),
            sink,
            Some(Arc::clone(&keys)),
            background.clone(),
        );
        tasks.push(recorder_task);

        let counters = Arc::new(backend.clone().map_or_else(CounterStore::memory, CounterStore::redis));

        let abuse = if config.abuse.enabled {
            let notifier = BlockNotifier::spawn(config.abuse.notify_url.clone());
            let detector = Arc::new(AbuseDetector::new(
                &config.abuse,
                backend.clone(),
                Some(notifier),
                Arc::clone(&clock),
            ));
            tasks.push(
                detector
                    .block_list()
                    .spawn_refresh(config.abuse.bloom_refresh_interval, background.clone()),
            );
            Some(detector)
        } else {
            None
        };

        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::new(&config.cache, backend.clone(), Arc::clone(&clock))));

        let edge = config
            .server
            .edge_guard
            .as_ref()
            .map(EdgeGuard::new)
            .transpose()
            .map_err(|e| anyhow::anyhow!("invalid edge guard: {e}"))?;

        let resolver = Arc::new(CredentialResolver::new(
            keys,
            tenants,
            plans,
            *catalog.defaults(),
            config.gateway.credential_cache_ttl,
            config.gateway.credential_cache_capacity,
        ));
        let key_admin = KeyAdmin::new(Arc::clone(&catalog), Arc::clone(&resolver));

        let gateway = Arc::new(Gateway {
            resolver,
            matcher: RouteMatcher::new(routes),
            edge,
            limiter: config.rate_limit.enabled.then(|| {
                RateLimiter::new(Arc::clone(&counters), Arc::clone(&clock), config.rate_limit.per_tenant)
            }),
            quota: config
                .quota
                .enabled
                .then(|| QuotaAccountant::new(Arc::clone(&counters), Arc::clone(&clock))),
            counters,
            abuse: abuse.clone(),
            cache,
            executor: ProxyExecutor::new(config.gateway.default_upstream_timeout())
                .map_err(|e| anyhow::anyhow!("failed to build upstream client: {e}"))?,
            recorder,
            clock,
            trusted_hops: config.server.client_ip.trusted_hops,
            max_body_size: config.server.max_body_size,
        });
        tasks.push(maintenance::spawn(
            Arc::clone(&gateway),
            maintenance::SWEEP_INTERVAL,
            background.clone(),
        ));

        let mut app = Router::new().fallback(pipeline::handle).with_state(gateway);

        if config.server.health.enabled {
            app = app.merge(
                Router::new()
                    .route(&config.server.health.path, get(health::health_handler))
                    .with_state(backend),
            );
        }

        // Innermost first: the request id is set before tracing sees the request
        app = app
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!("request", method = %request.method(), uri = %request.uri(), request_id)
            }))
            .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID), MakeRequestUuidV7));

        Ok(Self {
            router: app,
            listen_address,
            catalog,
            keys: key_admin,
            abuse,
            background,
            tasks,
        })
    }

    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Catalog backing credential and route resolution
    pub const fn catalog(&self) -> &Arc<MemoryCatalog> {
        &self.catalog
    }

    /// Key administration handle that invalidates cached credentials
    pub const fn keys(&self) -> &KeyAdmin {
        &self.keys
    }

    /// Abuse detector, `None` when detection is disabled
    pub const fn abuse(&self) -> Option<&Arc<AbuseDetector>> {
        self.abuse.as_ref()
    }

    /// Bind the configured address and serve until `shutdown` fires
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_address).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires
    ///
    /// After the listener drains, background workers are stopped and the
    /// outcome queue is flushed.
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "gateway listening");

        let Self {
            router,
            background,
            tasks,
            ..
        } = self;

        let served = axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await;

        background.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        served?;
        Ok(())
    }
}

/// Request ids as time-ordered UUIDs
#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::now_v7().to_string()).ok().map(RequestId::new)
    }
}
