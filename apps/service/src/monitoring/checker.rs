use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::transport::ProbeTransport;
use super::types::{ProbeFailure, ProbeOutcome, Service, ServiceId, UserId, error_chain};
use crate::database::models::NewStatusLog;
use crate::database::{ServiceRepository, StatusLogStore};
use crate::error::CheckError;
use crate::validation::parse_probe_url;

/// Default bound on writing one outcome
pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// The caller's deadline for one outbound probe
#[derive(Debug, Clone)]
pub struct ProbeDeadline {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ProbeDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, cancel: CancellationToken::new() }
    }

    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }
}

/// Counts for one `check_all` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Probes whose outcome was persisted
    pub checked: usize,
    pub online: usize,
    pub offline: usize,
    /// Probes whose outcome could not be persisted
    pub failed: usize,
    /// The batch stopped before reaching every service
    pub cancelled: bool,
}

/// Probes services and records the outcome.
///
/// Every `check` produces exactly one live-status write and one status-log
/// append. Writes run on their own task, bounded by the checker's
/// `lifetime` and never by the probe's deadline. The status write and the
/// append each get `persist_timeout`; only the status write can fail a check.
pub struct HealthChecker {
    transport: Arc<ProbeTransport>,
    services: Arc<dyn ServiceRepository>,
    logs: Arc<dyn StatusLogStore>,
    persist_timeout: Duration,
    lifetime: CancellationToken,
}

impl HealthChecker {
    pub fn new(
        transport: Arc<ProbeTransport>,
        services: Arc<dyn ServiceRepository>,
        logs: Arc<dyn StatusLogStore>,
        persist_timeout: Duration,
        lifetime: CancellationToken,
    ) -> Self {
        Self { transport, services, logs, persist_timeout, lifetime }
    }

    pub fn services(&self) -> &Arc<dyn ServiceRepository> {
        &self.services
    }

    /// Probe `service` and persist the outcome
    pub async fn check(&self, service: &Service, deadline: &ProbeDeadline) -> Result<ProbeOutcome, CheckError> {
        let outcome = self.probe(service, deadline).await;
        self.persist(outcome).await
    }

    /// Look the service up, then `check` it
    pub async fn check_by_id(&self, id: ServiceId, deadline: &ProbeDeadline) -> Result<ProbeOutcome, CheckError> {
        let service = self
            .services
            .get_by_id(id)
            .await
            .map_err(CheckError::Repository)?
            .ok_or(CheckError::ServiceNotFound(id))?;

        self.check(&service, deadline).await
    }

    /// Check every service of `user_id`, one at a time.
    ///
    /// `cancel` is only looked at between probes; a probe already in flight
    /// runs to its own `probe_timeout`.
    pub async fn check_all(
        &self,
        user_id: UserId,
        probe_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, CheckError> {
        let services = self.services.get_all_by_user(user_id).await.map_err(CheckError::Repository)?;
        info!(user_id, services = services.len(), "Starting check batch");

        let mut summary = BatchSummary::default();
        for service in &services {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                info!(user_id, remaining = services.len() - summary.checked - summary.failed, "Check batch cancelled");
                break;
            }

            match self.check(service, &ProbeDeadline::new(probe_timeout)).await {
                Ok(outcome) => {
                    summary.checked += 1;
                    if outcome.is_online() {
                        summary.online += 1;
                    } else {
                        summary.offline += 1;
                    }
                }
                Err(CheckError::ShuttingDown) => {
                    summary.failed += 1;
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(service_id = service.id, "Failed to record check: {}", e);
                }
            }
        }

        info!(
            user_id,
            checked = summary.checked,
            online = summary.online,
            offline = summary.offline,
            failed = summary.failed,
            "Check batch finished"
        );
        Ok(summary)
    }

    /// Run the probe only, classifying whatever happens into an outcome
    pub async fn probe(&self, service: &Service, deadline: &ProbeDeadline) -> ProbeOutcome {
        let url = match parse_probe_url(&service.url) {
            Ok(url) => url,
            Err(reason) => {
                warn!(service_id = service.id, "Probe target rejected: {}", reason);
                return ProbeOutcome::offline(service.id, None, ProbeFailure::Construction(reason));
            }
        };

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = deadline.cancel.cancelled() => Err(ProbeFailure::Cancelled),
            sent = tokio::time::timeout(deadline.timeout, self.transport.get(url)) => match sent {
                Ok(Ok(response)) => Ok(response.status().as_u16()),
                Ok(Err(e)) => Err(ProbeFailure::Transport(error_chain(&e))),
                Err(_) => Err(ProbeFailure::TimedOut(deadline.timeout)),
            },
        };
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(code) if (200..400).contains(&code) => ProbeOutcome::online(service.id, elapsed, code),
            Ok(code) => ProbeOutcome::offline(service.id, Some(elapsed), ProbeFailure::Http(code)),
            Err(failure) => ProbeOutcome::offline(service.id, Some(elapsed), failure),
        };

        match &outcome.error {
            None => debug!(service_id = service.id, latency_ms = ?outcome.response_time_ms, "Service online"),
            Some(reason) => warn!(service_id = service.id, url = %service.url, "Service offline: {}", reason),
        }
        outcome
    }

    async fn persist(&self, outcome: ProbeOutcome) -> Result<ProbeOutcome, CheckError> {
        let services = self.services.clone();
        let logs = self.logs.clone();
        let lifetime = self.lifetime.clone();
        let persist_timeout = self.persist_timeout;
        let record = outcome.clone();

        // Spawned so a dropped caller cannot abort a write that has started
        let write = tokio::spawn(async move {
            let updated = tokio::select! {
                biased;
                _ = lifetime.cancelled() => return Err(CheckError::ShuttingDown),
                written = tokio::time::timeout(persist_timeout, write_status(services.as_ref(), &record)) => {
                    written.unwrap_or(Err(CheckError::PersistenceTimeout(persist_timeout)))
                }
            };

            // The append never decides the result of the check
            tokio::select! {
                biased;
                _ = lifetime.cancelled() => {
                    warn!(service_id = record.service_id, "Status log append abandoned at shutdown");
                }
                appended = tokio::time::timeout(persist_timeout, append_log(logs.as_ref(), &record)) => {
                    if appended.is_err() {
                        warn!(
                            service_id = record.service_id,
                            "Status log append timed out after {}ms",
                            persist_timeout.as_millis()
                        );
                    }
                }
            }

            updated
        });

        match write.await {
            Ok(Ok(())) => Ok(outcome),
            Ok(Err(e)) => Err(e),
            Err(join) => Err(CheckError::Persistence(anyhow::anyhow!("persistence task failed: {join}"))),
        }
    }
}

async fn write_status(services: &dyn ServiceRepository, outcome: &ProbeOutcome) -> Result<(), CheckError> {
    let updated = match outcome.response_time_ms {
        Some(_) => {
            services
                .update_status_and_latency(outcome.service_id, outcome.status, outcome.response_time_ms)
                .await
        }
        None => services.update_status(outcome.service_id, outcome.status).await,
    };

    updated.map_err(CheckError::Persistence)
}

async fn append_log(logs: &dyn StatusLogStore, outcome: &ProbeOutcome) {
    if let Err(e) = logs.append(&NewStatusLog::from(outcome)).await {
        warn!(service_id = outcome.service_id, "Failed to append status log entry: {:#}", e);
    }
}
