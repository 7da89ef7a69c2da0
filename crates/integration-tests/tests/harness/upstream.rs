//! Mock upstream service for integration tests
//!
//! Echoes what it received as JSON, including the `x-request-id` header it
//! was sent. Paths ending in `/slow` answer after two seconds and paths
//! ending in `/status/<code>` answer with that code.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Mock upstream counting every call it serves
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    calls: AtomicU32,
    last_headers: Mutex<Option<HeaderMap>>,
}

impl MockUpstream {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for route configuration
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests served so far
    pub fn calls(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Headers of the most recent request
    pub fn last_headers(&self) -> HeaderMap {
        self.state.last_headers.lock().unwrap().clone().unwrap_or_default()
    }

    /// Poll until `calls` reaches `expected` or a second passes
    pub async fn wait_for_calls(&self, expected: u32) -> u32 {
        for _ in 0..50 {
            if self.calls() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.calls()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
    let request_id = headers.get("x-request-id").cloned();
    *state.last_headers.lock().unwrap() = Some(headers);

    let path = uri.path();
    if path.ends_with("/slow") {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    let status = path
        .rsplit_once("/status/")
        .and_then(|(_, code)| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let echo = serde_json::json!({
        "method": method.as_str(),
        "path": path,
        "query": uri.query(),
        "body_len": body.len(),
    });

    let mut response = (status, [("x-upstream-call", call.to_string())], axum::Json(echo)).into_response();
    if let Some(id) = request_id {
        response.headers_mut().insert("x-request-id", id);
    }
    response
}
