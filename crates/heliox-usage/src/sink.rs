use std::time::Duration;

use async_trait::async_trait;
use heliox_core::{RequestLog, RequestLogSink, StoreError};
use url::Url;

/// Posts outcome batches as `{"records": [...]}` to an analytics endpoint
#[derive(Debug, Clone)]
pub struct HttpRequestLogSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRequestLogSink {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RequestLogSink for HttpRequestLogSink {
    async fn append(&self, records: &[RequestLog]) -> Result<(), StoreError> {
        self.client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "records": records }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::debug!(count = records.len(), endpoint = %self.endpoint, "posted request outcomes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use heliox_core::{CacheStatus, ErrorType};
    use jiff::Timestamp;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record(request_id: &str) -> RequestLog {
        RequestLog {
            request_id: request_id.into(),
            tenant_id: None,
            key_id: None,
            route_id: None,
            client_ip: Some("203.0.113.9".into()),
            method: "GET".into(),
            path: "/v1/items".into(),
            timestamp: Timestamp::UNIX_EPOCH,
            latency_ms: 8,
            status: 504,
            cache_status: CacheStatus::Miss,
            error_type: ErrorType::UpstreamTimeout,
        }
    }

    #[tokio::test]
    async fn posts_batches_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/ingest", server.uri())).unwrap();
        let sink = HttpRequestLogSink::new(endpoint, Duration::from_secs(5)).unwrap();
        sink.append(&[record("a"), record("b")]).await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["records"].as_array().unwrap().len(), 2);
        assert_eq!(body["records"][1]["request_id"], "b");
        assert_eq!(body["records"][0]["error_type"], "upstream_timeout");
    }

    #[tokio::test]
    async fn rejected_batch_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = HttpRequestLogSink::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap();
        let err = sink.append(&[record("a")]).await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
