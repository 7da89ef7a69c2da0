use std::net::IpAddr;
use std::time::Instant;

use heliox_core::{CacheStatus, ErrorType, RequestLog};
use heliox_usage::OutcomeRecorder;
use jiff::Timestamp;
use uuid::Uuid;

/// Status recorded when the client goes away before a response
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Builds the outcome record for one request and hands it off exactly once
///
/// Dropping the guard without [`finish`](Self::finish), which happens when
/// the client disconnects and the request future is cancelled, records a
/// `client_disconnect` outcome.
pub struct OutcomeGuard {
    recorder: OutcomeRecorder,
    record: Option<RequestLog>,
    started: Instant,
}

impl OutcomeGuard {
    pub fn new(
        recorder: OutcomeRecorder,
        request_id: String,
        method: &str,
        path: &str,
        client_ip: Option<IpAddr>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            recorder,
            record: Some(RequestLog {
                request_id,
                tenant_id: None,
                key_id: None,
                route_id: None,
                client_ip: client_ip.map(|ip| ip.to_string()),
                method: method.to_string(),
                path: path.to_string(),
                timestamp,
                latency_ms: 0,
                status: CLIENT_CLOSED_REQUEST,
                cache_status: CacheStatus::Bypass,
                error_type: ErrorType::ClientDisconnect,
            }),
            started: Instant::now(),
        }
    }

    pub fn identify(&mut self, tenant_id: Uuid, key_id: Uuid) {
        if let Some(record) = self.record.as_mut() {
            record.tenant_id = Some(tenant_id);
            record.key_id = Some(key_id);
        }
    }

    pub fn route(&mut self, route_id: Uuid) {
        if let Some(record) = self.record.as_mut() {
            record.route_id = Some(route_id);
        }
    }

    pub fn finish(mut self, status: u16, cache_status: CacheStatus, error_type: ErrorType) {
        if let Some(mut record) = self.record.take() {
            record.status = status;
            record.cache_status = cache_status;
            record.error_type = error_type;
            self.submit(record);
        }
    }

    fn submit(&self, mut record: RequestLog) {
        record.latency_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.recorder.record(record);
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            tracing::debug!(request_id = %record.request_id, "client disconnected before response");
            self.submit(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use heliox_core::{DefaultLimits, MemoryCatalog};
    use heliox_usage::RecorderSettings;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn recorder(
        catalog: &Arc<MemoryCatalog>,
        shutdown: &CancellationToken,
    ) -> (OutcomeRecorder, tokio::task::JoinHandle<()>) {
        OutcomeRecorder::spawn(
            RecorderSettings {
                batch_size: 100,
                flush_interval: Duration::from_secs(3600),
                queue_capacity: 16,
            },
            catalog.clone(),
            None,
            shutdown.clone(),
        )
    }

    #[tokio::test]
    async fn finished_request_records_its_outcome() {
        let catalog = Arc::new(MemoryCatalog::new(DefaultLimits::default()));
        let shutdown = CancellationToken::new();
        let (recorder, handle) = recorder(&catalog, &shutdown);
        let key_id = Uuid::now_v7();

        let mut guard = OutcomeGuard::new(recorder, "r1".into(), "GET", "/v1", None, Timestamp::UNIX_EPOCH);
        guard.identify(Uuid::now_v7(), key_id);
        guard.finish(200, CacheStatus::Hit, ErrorType::None);
        shutdown.cancel();
        handle.await.unwrap();

        let logs = catalog.request_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].key_id, Some(key_id));
        assert_eq!(logs[0].cache_status, CacheStatus::Hit);
        assert!(logs[0].is_success());
    }

    #[tokio::test]
    async fn dropped_request_records_client_disconnect() {
        let catalog = Arc::new(MemoryCatalog::new(DefaultLimits::default()));
        let shutdown = CancellationToken::new();
        let (recorder, handle) = recorder(&catalog, &shutdown);

        drop(OutcomeGuard::new(
            recorder,
            "r2".into(),
            "GET",
            "/v1",
            Some("192.0.2.1".parse().unwrap()),
            Timestamp::UNIX_EPOCH,
        ));
        shutdown.cancel();
        handle.await.unwrap();

        let logs = catalog.request_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, 499);
        assert_eq!(logs[0].error_type, ErrorType::ClientDisconnect);
        assert_eq!(logs[0].client_ip.as_deref(), Some("192.0.2.1"));
    }
}
