use heliox_core::{BlockRule, BlockTarget};
use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

/// Emitted whenever the detector issues a new block rule
#[derive(Debug, Clone, Serialize)]
pub struct BlockEvent {
    pub target: BlockTarget,
    pub reason: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl From<&BlockRule> for BlockEvent {
    fn from(rule: &BlockRule) -> Self {
        Self {
            target: rule.target,
            reason: rule.reason.clone(),
            created_at: rule.created_at,
            expires_at: rule.expires_at,
        }
    }
}

/// Fire-and-forget dispatch of block events to a background worker
///
/// Events are logged and, when a webhook is configured, POSTed as JSON.
/// Delivery never blocks or fails the request that triggered the block.
#[derive(Debug, Clone)]
pub struct BlockNotifier {
    tx: mpsc::UnboundedSender<BlockEvent>,
}

impl BlockNotifier {
    /// Spawn the worker; it runs until every notifier handle is dropped
    #[must_use]
    pub fn spawn(webhook: Option<Url>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(rx, webhook));
        Self { tx }
    }

    pub fn notify(&self, event: BlockEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!(error = %e, "failed to enqueue block event, worker stopped");
        }
    }
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<BlockEvent>, webhook: Option<Url>) {
    let http = reqwest::Client::new();

    while let Some(event) = rx.recv().await {
        tracing::warn!(
            block = %event.target,
            reason = %event.reason,
            expires_at = %event.expires_at,
            "identifier blocked"
        );

        let Some(url) = webhook.as_ref() else {
            continue;
        };

        match http.post(url.clone()).json(&event).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "block webhook rejected event");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to deliver block event"),
        }
    }
}
