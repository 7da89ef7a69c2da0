use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use heliox_core::headers::{forwardable_request_headers, forwardable_response_headers};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::UpstreamError;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Request ready to be sent upstream
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub url: Url,
    /// Incoming client headers, filtered before sending
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: Option<IpAddr>,
    /// Whether `Authorization` carried the gateway key
    pub bearer_was_credential: bool,
    /// Route override, the executor default applies when `None`
    pub timeout: Option<Duration>,
}

/// Fully read upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Headers safe to return to the client
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Forwards admitted requests to route upstreams
///
/// One pooled client is shared by every route. Calls are never retried;
/// the whole exchange, body included, is bounded by the timeout.
#[derive(Debug, Clone)]
pub struct ProxyExecutor {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl ProxyExecutor {
    pub fn new(default_timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .tcp_nodelay(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            default_timeout,
        })
    }

    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn execute(&self, request: ForwardRequest) -> Result<UpstreamResponse, UpstreamError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let mut headers = forwardable_request_headers(&request.headers, request.bearer_was_credential);
        if let Some(ip) = request.client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        let method = request.method.clone();
        let url = request.url.clone();
        let send = async {
            let response = self
                .client
                .request(request.method, request.url)
                .headers(headers)
                .body(request.body)
                .send()
                .await?;
            let status = response.status();
            let headers = forwardable_response_headers(response.headers());
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(UpstreamResponse { status, headers, body })
        };

        let result = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(UpstreamError::classify(&e, timeout)),
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };

        match &result {
            Ok(response) => tracing::debug!(%method, %url, status = response.status.as_u16(), "upstream responded"),
            Err(e) => tracing::warn!(%method, %url, error = %e, "upstream call failed"),
        }
        result
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {ip}"),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}
