use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use heliox_config::AbuseConfig;
use heliox_core::{BlockRule, BlockTarget, SharedBackend, SharedClock};
use uuid::Uuid;

use crate::blocklist::{BlockList, BloomSizing, RuleStore, retry_after};
use crate::error::AbuseError;
use crate::notify::{BlockEvent, BlockNotifier};
use crate::stats::{DetectorParams, Evaluation};
use crate::store::{Signal, StatsStore};

/// Whether an upstream status counts toward the error ratio
///
/// Client errors other than 429 indicate probing or credential stuffing.
pub fn is_error_status(status: u16) -> bool {
    (400..500).contains(&status) && status != 429
}

/// Rolling anomaly detection per key and per client IP, backed by the block list
pub struct AbuseDetector {
    params: DetectorParams,
    track_ips: bool,
    block_duration: Duration,
    stats: StatsStore,
    blocks: Arc<BlockList>,
    notifier: Option<BlockNotifier>,
    clock: SharedClock,
}

impl AbuseDetector {
    /// Build with in-process stores, or Redis-backed ones when `backend` is set
    pub fn new(
        config: &AbuseConfig,
        backend: Option<SharedBackend>,
        notifier: Option<BlockNotifier>,
        clock: SharedClock,
    ) -> Self {
        let (stats, rules) = match backend {
            Some(backend) => (StatsStore::redis(backend.clone()), RuleStore::redis(backend)),
            None => (StatsStore::memory(), RuleStore::memory()),
        };
        let sizing = BloomSizing {
            expected_items: config.bloom_expected_items,
            false_positive_rate: config.bloom_false_positive_rate,
        };

        Self {
            params: DetectorParams::from(config),
            track_ips: config.track_ips,
            block_duration: config.block_duration,
            stats,
            blocks: Arc::new(BlockList::new(rules, sizing, Arc::clone(&clock))),
            notifier,
            clock,
        }
    }

    pub const fn block_list(&self) -> &Arc<BlockList> {
        &self.blocks
    }

    pub const fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Reject if a rule is in effect for the key or the client IP
    pub async fn check_blocked(&self, key_id: Uuid, ip: Option<IpAddr>) -> Result<(), AbuseError> {
        let targets = std::iter::once(BlockTarget::ApiKey(key_id)).chain(ip.map(BlockTarget::ClientIp));

        for target in targets {
            if let Some(rule) = self.blocks.check(target).await {
                return Err(AbuseError::Blocked {
                    target,
                    retry_after: retry_after(&rule, self.clock.now()),
                    reason: rule.reason,
                });
            }
        }

        Ok(())
    }

    /// Count an admitted request; blocks and rejects when a streak completes
    ///
    /// Every tracked identifier is counted before the verdict so an early
    /// block on the key does not hide the request from the IP statistics.
    pub async fn observe(&self, key_id: Uuid, ip: Option<IpAddr>) -> Result<(), AbuseError> {
        let mut verdict = Ok(());
        for target in self.targets(key_id, ip) {
            let evaluation = self.evaluate(target, Signal::Request).await;
            if evaluation.flagged {
                let rule = self.issue(target, "request rate anomaly", &evaluation).await;
                if verdict.is_ok() {
                    verdict = Err(AbuseError::Blocked {
                        target,
                        retry_after: retry_after(&rule, self.clock.now()),
                        reason: rule.reason,
                    });
                }
            }
        }
        verdict
    }

    /// Feed the upstream status into the error ratio
    ///
    /// Runs after the response, so a block issued here applies from the
    /// next request on.
    pub async fn record_outcome(&self, key_id: Uuid, ip: Option<IpAddr>, status: u16) {
        if !is_error_status(status) {
            return;
        }

        for target in self.targets(key_id, ip) {
            let evaluation = self.evaluate(target, Signal::Error).await;
            if evaluation.flagged {
                self.issue(target, "error ratio anomaly", &evaluation).await;
            }
        }
    }

    /// Block `target` for `duration` regardless of statistics
    pub async fn block(&self, target: BlockTarget, reason: &str, duration: Duration) -> BlockRule {
        let rule = BlockRule::new(target, reason, self.clock.now(), duration);
        self.blocks.block(rule.clone()).await;
        self.announce(&rule);
        rule
    }

    pub async fn unblock(&self, target: BlockTarget) -> bool {
        self.blocks.unblock(target).await
    }

    /// Drop idle in-process statistics
    pub fn sweep(&self) -> usize {
        self.stats.sweep(self.clock.now(), &self.params)
    }

    fn targets(&self, key_id: Uuid, ip: Option<IpAddr>) -> impl Iterator<Item = BlockTarget> + use<> {
        let ip = if self.track_ips { ip } else { None };
        std::iter::once(BlockTarget::ApiKey(key_id)).chain(ip.map(BlockTarget::ClientIp))
    }

    async fn evaluate(&self, target: BlockTarget, signal: Signal) -> Evaluation {
        let identifier = target.identifier();
        let evaluation = self
            .stats
            .observe(&identifier, signal, self.clock.now(), &self.params)
            .await;

        if let Some(z) = evaluation.z
            && evaluation.streak > 0
        {
            tracing::debug!(%identifier, z, streak = evaluation.streak, "anomalous window");
        }
        evaluation
    }

    async fn issue(&self, target: BlockTarget, reason: &str, evaluation: &Evaluation) -> BlockRule {
        let rule = BlockRule::new(target, reason, self.clock.now(), self.block_duration);
        self.blocks.block(rule.clone()).await;
        self.stats.reset_streak(&target.identifier()).await;

        tracing::info!(
            block = %target,
            streak = evaluation.streak,
            z = ?evaluation.z,
            duration = ?self.block_duration,
            "blocking anomalous traffic"
        );
        self.announce(&rule);
        rule
    }

    fn announce(&self, rule: &BlockRule) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(BlockEvent::from(rule));
        }
    }
}

impl std::fmt::Debug for AbuseDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbuseDetector")
            .field("params", &self.params)
            .field("track_ips", &self.track_ips)
            .finish_non_exhaustive()
    }
}
