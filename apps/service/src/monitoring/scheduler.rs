use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::checker::{BatchSummary, HealthChecker};
use crate::error::CheckError;

/// Periodic trigger for check batches.
///
/// Each cycle runs `check_all` for every owner in turn, so at most one probe
/// is in flight across the whole scheduler.
pub struct CheckScheduler {
    checker: Arc<HealthChecker>,
    interval: Duration,
    probe_timeout: Duration,
}

impl CheckScheduler {
    pub fn new(checker: Arc<HealthChecker>, interval: Duration, probe_timeout: Duration) -> Self {
        Self { checker, interval, probe_timeout }
    }

    /// Run one cycle over every owner, stopping early once `shutdown` fires
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<BatchSummary, CheckError> {
        let services = self.checker.services().get_all().await.map_err(CheckError::Repository)?;
        let owners: BTreeSet<_> = services.iter().map(|s| s.user_id).collect();

        let mut total = BatchSummary::default();
        for user_id in owners {
            if shutdown.is_cancelled() {
                total.cancelled = true;
                break;
            }

            match self.checker.check_all(user_id, self.probe_timeout, shutdown).await {
                Ok(summary) => {
                    total.checked += summary.checked;
                    total.online += summary.online;
                    total.offline += summary.offline;
                    total.failed += summary.failed;
                    total.cancelled |= summary.cancelled;
                }
                Err(e) => tracing::error!(user_id, "Check batch failed: {}", e),
            }
        }

        Ok(total)
    }

    /// Spawn the loop; it exits when `shutdown` is cancelled
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!("Check scheduler started (every {}s)", self.interval.as_secs());

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }

                match self.run_cycle(&shutdown).await {
                    Ok(summary) => tracing::debug!(
                        checked = summary.checked,
                        online = summary.online,
                        offline = summary.offline,
                        "Check cycle complete"
                    ),
                    Err(e) => tracing::error!("Check cycle failed: {}", e),
                }
            }

            tracing::info!("Check scheduler stopped");
        })
    }
}
