//! Admission and forwarding for every non-health request
//!
//! Gates run in a fixed order: edge guard, credential, block list, route,
//! rate, quota, anomaly statistics. Admitted requests are answered from the
//! cache or forwarded upstream. Every request, rejected or not, leaves
//! exactly one outcome record.

use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use bytes::Bytes;
use heliox_abuse::AbuseDetector;
use heliox_auth::{CredentialResolver, ResolvedCredential, extract_credential};
use heliox_cache::{CachedResponse, Lookup, ResponseCache, StoreOutcome, cache_key};
use heliox_core::headers::{CACHE_STATUS, REQUEST_ID};
use heliox_core::{CachePolicy, CacheStatus, ErrorType, GatewayError, Route, SharedClock};
use heliox_proxy::{ForwardRequest, ProxyExecutor, UpstreamResponse};
use heliox_ratelimit::{
    BucketLimits, CounterStore, EdgeGuard, QuotaAccountant, QuotaLimits, RateLimiter, RateSubject,
};
use heliox_routing::{RouteMatcher, upstream_url};
use heliox_usage::OutcomeRecorder;
use http::header::{AGE, CONTENT_LENGTH, HOST};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, StatusCode};
use secrecy::ExposeSecret;

use crate::client_ip::client_ip;
use crate::error::error_response;
use crate::outcome::OutcomeGuard;

/// Shared state behind the fallback handler
///
/// Optional stages are `None` when switched off in configuration.
pub struct Gateway {
    pub(crate) resolver: Arc<CredentialResolver>,
    pub(crate) matcher: RouteMatcher,
    pub(crate) edge: Option<EdgeGuard>,
    pub(crate) limiter: Option<RateLimiter>,
    pub(crate) quota: Option<QuotaAccountant>,
    pub(crate) counters: Arc<CounterStore>,
    pub(crate) abuse: Option<Arc<AbuseDetector>>,
    pub(crate) cache: Option<Arc<ResponseCache>>,
    pub(crate) executor: ProxyExecutor,
    pub(crate) recorder: OutcomeRecorder,
    pub(crate) clock: SharedClock,
    pub(crate) trusted_hops: Option<usize>,
    pub(crate) max_body_size: usize,
}

/// Response produced by an admitted request
struct Served {
    response: Response,
    cache_status: CacheStatus,
}

/// Who is calling and where the request goes
struct Admission {
    credential: Arc<ResolvedCredential>,
    bearer_was_credential: bool,
    route: Route,
}

/// Axum fallback handler running the whole pipeline
pub async fn handle(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let ip = client_ip(&parts, gateway.trusted_hops);
    let request_id = parts
        .headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut outcome = OutcomeGuard::new(
        gateway.recorder.clone(),
        request_id,
        parts.method.as_str(),
        parts.uri.path(),
        ip,
        gateway.clock.now(),
    );

    match gateway.run(&parts, body, ip, &mut outcome).await {
        Ok(served) => {
            outcome.finish(served.response.status().as_u16(), served.cache_status, ErrorType::None);
            served.response
        }
        Err(error) => {
            match &error {
                GatewayError::Internal(message) => tracing::error!(error = %message, "request failed"),
                other => tracing::debug!(error = %other, "request rejected"),
            }
            let response = error_response(&error);
            outcome.finish(response.status().as_u16(), CacheStatus::Bypass, error.outcome_type());
            response
        }
    }
}

impl Gateway {
    async fn run(
        &self,
        parts: &Parts,
        body: Body,
        ip: Option<IpAddr>,
        outcome: &mut OutcomeGuard,
    ) -> Result<Served, GatewayError> {
        let admission = self.admit(parts, ip, outcome).await?;
        let body = self.read_body(parts, body).await?;
        self.serve(parts, body, ip, admission).await
    }

    async fn admit(
        &self,
        parts: &Parts,
        ip: Option<IpAddr>,
        outcome: &mut OutcomeGuard,
    ) -> Result<Admission, GatewayError> {
        if let (Some(edge), Some(ip)) = (&self.edge, ip) {
            edge.check(ip)?;
        }

        let raw = extract_credential(&parts.headers).ok_or(GatewayError::Unauthorized)?;
        let credential = self.resolver.resolve(raw.secret.expose_secret()).await?;
        outcome.identify(credential.tenant_id, credential.key_id);

        if let Some(abuse) = &self.abuse {
            abuse.check_blocked(credential.key_id, ip).await?;
        }

        let route = self
            .matcher
            .resolve(credential.tenant_id, parts.method.as_str(), request_host(parts), parts.uri.path())
            .await?;
        outcome.route(route.id);

        if let Some(limiter) = &self.limiter {
            let limits = &credential.limits;
            let tenant = &credential.tenant_limits;
            limiter
                .check(&RateSubject {
                    key_id: credential.key_id,
                    key_limits: BucketLimits::new(limits.rate_limit_rps, limits.rate_limit_burst),
                    tenant_id: credential.tenant_id,
                    tenant_limits: BucketLimits::new(tenant.rate_limit_rps, tenant.rate_limit_burst),
                })
                .await?;
        }

        if let Some(quota) = &self.quota {
            quota
                .consume(credential.key_id, QuotaLimits::from(&credential.limits))
                .await?;
        }

        if let Some(abuse) = &self.abuse {
            abuse.observe(credential.key_id, ip).await?;
        }

        Ok(Admission {
            credential,
            bearer_was_credential: raw.bearer_was_credential(),
            route,
        })
    }

    async fn read_body(&self, parts: &Parts, body: Body) -> Result<Bytes, GatewayError> {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(GatewayError::PayloadTooLarge);
        }

        axum::body::to_bytes(body, self.max_body_size).await.map_err(|e| {
            tracing::debug!(error = %e, "request body rejected");
            GatewayError::PayloadTooLarge
        })
    }

    async fn serve(
        &self,
        parts: &Parts,
        body: Bytes,
        ip: Option<IpAddr>,
        admission: Admission,
    ) -> Result<Served, GatewayError> {
        let Admission {
            credential,
            bearer_was_credential,
            route,
        } = admission;
        let method = parts.method.as_str();
        let path = parts.uri.path();
        let query = parts.uri.query();

        let request = ForwardRequest {
            method: parts.method.clone(),
            url: upstream_url(&route, path, query)?,
            headers: parts.headers.clone(),
            body,
            client_ip: ip,
            bearer_was_credential,
            timeout: route.timeout,
        };

        let cacheable = match (&self.cache, &route.cache_policy) {
            (Some(cache), Some(policy))
                if credential.limits.cache_enabled && ResponseCache::accepts_request(policy, method, &parts.headers) =>
            {
                Some((cache, policy))
            }
            _ => None,
        };

        let Some((cache, policy)) = cacheable else {
            let upstream = self.forward(request, &credential, ip).await?;
            return Ok(served_upstream(upstream, CacheStatus::Bypass));
        };

        let key = cache_key(route.id, method, path, query, &parts.headers, policy);
        match cache.lookup(&key).await {
            Lookup::Hit(entry) => served_cached(&entry, CacheStatus::Hit, cache),
            Lookup::Stale(entry) => {
                if policy.revalidate {
                    self.revalidate(cache, &key, policy, request);
                }
                served_cached(&entry, CacheStatus::Stale, cache)
            }
            Lookup::Miss => {
                let upstream = self.forward(request, &credential, ip).await?;
                let stored = cache
                    .store(&key, policy, upstream.status.as_u16(), &upstream.headers, upstream.body.clone())
                    .await;
                let status = if stored == StoreOutcome::TooLarge {
                    CacheStatus::Bypass
                } else {
                    CacheStatus::Miss
                };
                Ok(served_upstream(upstream, status))
            }
        }
    }

    /// Call upstream and feed the status into the error ratio
    async fn forward(
        &self,
        request: ForwardRequest,
        credential: &ResolvedCredential,
        ip: Option<IpAddr>,
    ) -> Result<UpstreamResponse, GatewayError> {
        let response = self.executor.execute(request).await?;
        if let Some(abuse) = &self.abuse {
            abuse
                .record_outcome(credential.key_id, ip, response.status.as_u16())
                .await;
        }
        Ok(response)
    }

    /// Refresh a stale entry off the request path, at most once per key
    fn revalidate(&self, cache: &Arc<ResponseCache>, key: &str, policy: &CachePolicy, request: ForwardRequest) {
        let Some(guard) = cache.begin_revalidation(key) else {
            return;
        };

        let cache = Arc::clone(cache);
        let executor = self.executor.clone();
        let policy = policy.clone();
        tokio::spawn(async move {
            match executor.execute(request).await {
                Ok(response) => {
                    let stored = cache
                        .store(guard.key(), &policy, response.status.as_u16(), &response.headers, response.body)
                        .await;
                    tracing::debug!(key = %guard.key(), ?stored, "stale entry revalidated");
                }
                Err(e) => tracing::warn!(key = %guard.key(), error = %e, "revalidation failed, keeping stale entry"),
            }
        });
    }
}

/// Host the client addressed, from `Host` or the absolute-form URI
fn request_host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Bytes, cache_status: CacheStatus) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .insert(CACHE_STATUS, HeaderValue::from_static(cache_status.as_str()));
    response
}

fn served_upstream(upstream: UpstreamResponse, cache_status: CacheStatus) -> Served {
    Served {
        response: build_response(upstream.status, upstream.headers, upstream.body, cache_status),
        cache_status,
    }
}

fn served_cached(
    entry: &CachedResponse,
    cache_status: CacheStatus,
    cache: &ResponseCache,
) -> Result<Served, GatewayError> {
    let status = StatusCode::from_u16(entry.status).map_err(|e| GatewayError::Internal(e.to_string()))?;
    let mut response = build_response(status, entry.header_map(), entry.body.clone(), cache_status);
    let age = entry.age(cache.clock().now()).as_secs();
    response.headers_mut().insert(AGE, HeaderValue::from(age));

    Ok(Served {
        response,
        cache_status,
    })
}
