use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Gateway;

/// How often idle in-process state is swept
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

impl Gateway {
    /// Drop idle buckets, quota counters, IP allowances and detector statistics
    pub(crate) fn sweep(&self) -> usize {
        let now = self.clock.now();
        if let Some(edge) = &self.edge {
            edge.sweep();
        }

        let mut removed = self.counters.sweep(now);
        if let Some(abuse) = &self.abuse {
            removed += abuse.sweep();
        }
        removed
    }
}

/// Periodic sweep until `shutdown` fires
pub fn spawn(gateway: Arc<Gateway>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = gateway.sweep();
                    tracing::debug!(removed, "idle state swept");
                }
            }
        }
    })
}
