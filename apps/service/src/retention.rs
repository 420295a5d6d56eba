//! Retention sweep for the status log.
//!
//! Entries older than the configured number of days are deleted, once on
//! request and then periodically as a background task.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::StatusLogStore;
use crate::error::QueryError;

/// How long status log entries are kept, and how often the sweep runs
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub days: i64,
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { days: 30, sweep_interval: Duration::from_secs(3600) }
    }
}

/// Cutoff for a `days` window ending at `now`; `days` must be at least 1
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, QueryError> {
    if days < 1 {
        return Err(QueryError::InvalidRetention(days));
    }
    chrono::Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(QueryError::InvalidRetention(days))
}

pub struct RetentionSweep {
    logs: Arc<dyn StatusLogStore>,
    policy: RetentionPolicy,
}

impl RetentionSweep {
    pub fn new(logs: Arc<dyn StatusLogStore>, policy: RetentionPolicy) -> Self {
        Self { logs, policy }
    }

    /// Delete entries older than `now - days`, returning how many went
    pub async fn sweep(&self, days: i64) -> Result<u64, QueryError> {
        let cutoff = retention_cutoff(Utc::now(), days)?;
        debug!("Pruning status log entries older than {} ({} days)", cutoff, days);

        let deleted = self.logs.prune_older_than(cutoff).await.map_err(QueryError::Store)?;
        info!("Retention sweep completed: {} status log entries deleted", deleted);
        Ok(deleted)
    }

    /// Sweep with the configured policy every `sweep_interval` until `shutdown`
    pub fn start_periodic_sweep(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.policy.sweep_interval);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                if let Err(e) = self.sweep(self.policy.days).await {
                    warn!("Periodic retention sweep failed: {}", e);
                }
            }

            debug!("Retention sweep task stopped");
        })
    }
}
