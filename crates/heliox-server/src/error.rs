use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use heliox_core::{GatewayError, HttpError};
use http::HeaderValue;
use http::header::RETRY_AFTER;

/// Whole seconds for `Retry-After`, rounded up and at least 1
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

/// JSON error body with `Retry-After` where the error carries one
pub fn error_response(error: &GatewayError) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });

    let mut response = (error.status_code(), Json(body)).into_response();
    if let Some(wait) = error.retry_after() {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(wait)));
    }
    response
}

#[cfg(test)]
mod tests {
    use heliox_core::QuotaPeriod;
    use http::StatusCode;

    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(100)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(2)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(2_001)), 3);
    }

    #[tokio::test]
    async fn renders_type_message_and_retry_after() {
        let response = error_response(&GatewayError::QuotaExceeded {
            period: QuotaPeriod::Daily,
            retry_after: Duration::from_millis(1_500),
        });

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "2");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "quota_exceeded");
        assert_eq!(json["error"]["message"], "daily quota exceeded");
    }

    #[test]
    fn unauthorized_has_no_retry_after() {
        let response = error_response(&GatewayError::Unauthorized);

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }
}
