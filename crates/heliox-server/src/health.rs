use axum::extract::State;
use axum::response::IntoResponse;
use heliox_core::SharedBackend;
use http::StatusCode;

/// Liveness probe, answered outside the admission pipeline
///
/// Reports `degraded` while the shared backend circuit is open; the
/// gateway still serves traffic from in-process state then.
pub async fn health_handler(State(backend): State<Option<SharedBackend>>) -> impl IntoResponse {
    let degraded = backend.as_ref().is_some_and(|b| b.circuit().is_degraded());
    (StatusCode::OK, if degraded { "degraded" } else { "ok" })
}
