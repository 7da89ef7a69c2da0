use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use heliox_config::AnalyticsConfig;
use heliox_core::{KeyStore, RequestLog, RequestLogSink};
use jiff::Timestamp;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Batching parameters for the recorder
#[derive(Debug, Clone, Copy)]
pub struct RecorderSettings {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
}

impl From<&AnalyticsConfig> for RecorderSettings {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval,
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self::from(&AnalyticsConfig::default())
    }
}

/// Hands request outcomes to a background batching task
///
/// Recording never waits on the sink. When the queue is full the record is
/// handed to a short-lived task instead of being dropped.
#[derive(Clone)]
pub struct OutcomeRecorder {
    tx: mpsc::Sender<RequestLog>,
}

impl OutcomeRecorder {
    /// Spawn the batching task
    ///
    /// Batches go to `sink` when `batch_size` records are pending or every
    /// `flush_interval`, whichever comes first. After each batch the keys in
    /// it have their `last_used_at` advanced through `keys`. On shutdown
    /// the queue is drained and flushed before the task exits.
    pub fn spawn(
        settings: RecorderSettings,
        sink: Arc<dyn RequestLogSink>,
        keys: Option<Arc<dyn KeyStore>>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let handle = tokio::spawn(run(rx, settings, sink, keys, shutdown));
        (Self { tx }, handle)
    }

    pub fn record(&self, record: RequestLog) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    tracing::warn!(
                        request_id = %record.request_id,
                        "outcome queue full outside a runtime, record dropped"
                    );
                    return;
                };
                let tx = self.tx.clone();
                runtime.spawn(async move {
                    if let Err(e) = tx.send(record).await {
                        tracing::warn!(request_id = %e.0.request_id, "outcome recorder stopped, record dropped");
                    }
                });
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(request_id = %record.request_id, "outcome recorder stopped, record dropped");
            }
        }
    }
}

impl std::fmt::Debug for OutcomeRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeRecorder").finish_non_exhaustive()
    }
}

async fn run(
    mut rx: mpsc::Receiver<RequestLog>,
    settings: RecorderSettings,
    sink: Arc<dyn RequestLogSink>,
    keys: Option<Arc<dyn KeyStore>>,
    shutdown: CancellationToken,
) {
    let mut buffer: Vec<RequestLog> = Vec::with_capacity(settings.batch_size);
    let mut ticker = tokio::time::interval(settings.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(record) => {
                    buffer.push(record);
                    if buffer.len() >= settings.batch_size {
                        flush(&mut buffer, sink.as_ref(), keys.as_deref()).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => flush(&mut buffer, sink.as_ref(), keys.as_deref()).await,
            () = shutdown.cancelled() => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    buffer.push(record);
                }
                break;
            }
        }
    }

    flush(&mut buffer, sink.as_ref(), keys.as_deref()).await;
    tracing::debug!("outcome recorder stopped");
}

async fn flush(buffer: &mut Vec<RequestLog>, sink: &dyn RequestLogSink, keys: Option<&dyn KeyStore>) {
    if buffer.is_empty() {
        return;
    }

    let batch = std::mem::take(buffer);
    if let Err(e) = sink.append(&batch).await {
        tracing::warn!(error = %e, count = batch.len(), "failed to append request outcomes");
    }

    let Some(keys) = keys else {
        return;
    };
    for (key_id, at) in latest_use(&batch) {
        if let Err(e) = keys.touch_last_used(key_id, at).await {
            tracing::warn!(error = %e, %key_id, "failed to update key last use");
        }
    }
}

/// Latest request timestamp per key in a batch
fn latest_use(batch: &[RequestLog]) -> HashMap<Uuid, Timestamp> {
    let mut latest: HashMap<Uuid, Timestamp> = HashMap::new();
    for record in batch {
        if let Some(key_id) = record.key_id {
            latest
                .entry(key_id)
                .and_modify(|at| *at = (*at).max(record.timestamp))
                .or_insert(record.timestamp);
        }
    }
    latest
}
