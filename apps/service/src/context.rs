use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::database::{self, LibsqlServiceRepository, LibsqlStatusLogStore};
use crate::metrics::MetricsAggregator;
use crate::monitoring::{
    CheckScheduler, HealthChecker, NetworkClassifier, ProbeDeadline, ProbeTransport, TransportOptions,
};
use crate::pool::open_pool;
use crate::retention::{RetentionPolicy, RetentionSweep};

/// Everything a binary needs, wired from one [`Config`]
pub struct Nimbus {
    pub config: Config,
    pub services: Arc<LibsqlServiceRepository>,
    pub logs: Arc<LibsqlStatusLogStore>,
    pub checker: Arc<HealthChecker>,
    pub aggregator: Arc<MetricsAggregator>,
    pub lifetime: CancellationToken,
}

impl Nimbus {
    /// Open the database, run migrations and build the probing stack.
    ///
    /// Cancelling `lifetime` stops pending persistence and background tasks.
    pub async fn open(config: Config, lifetime: CancellationToken) -> Result<Self> {
        let pool = open_pool(&config.database.path, config.database.max_connections).await?;
        database::initialize_database(&pool).await?;

        let services = Arc::new(LibsqlServiceRepository::new(pool.clone()));
        let logs = Arc::new(LibsqlStatusLogStore::new(pool.clone()));

        let classifier = Arc::new(NetworkClassifier::new(config.probe.dns_cache_ttl()));
        let options = TransportOptions {
            user_agent: config.probe.user_agent.clone(),
            connect_timeout: config.probe.connect_timeout(),
        };
        let transport =
            Arc::new(ProbeTransport::new(classifier, &options).context("failed to build HTTP clients")?);

        let checker = Arc::new(HealthChecker::new(
            transport,
            services.clone(),
            logs.clone(),
            config.probe.persist_timeout(),
            lifetime.clone(),
        ));
        let aggregator = Arc::new(MetricsAggregator::new(services.clone(), logs.clone()));

        info!("Opened database at {}", config.database.path.display());
        Ok(Self { config, services, logs, checker, aggregator, lifetime })
    }

    /// A fresh probe deadline with the configured timeout
    pub fn probe_deadline(&self) -> ProbeDeadline {
        ProbeDeadline::new(self.config.probe.timeout())
    }

    pub fn scheduler(&self) -> CheckScheduler {
        CheckScheduler::new(
            self.checker.clone(),
            Duration::from_secs(self.config.scheduler.interval_secs),
            self.config.probe.timeout(),
        )
    }

    /// Stop background tasks and any persistence still pending
    pub fn shutdown(&self) {
        self.lifetime.cancel();
    }

    pub fn retention(&self) -> RetentionSweep {
        RetentionSweep::new(
            self.logs.clone(),
            RetentionPolicy {
                days: self.config.retention.days,
                sweep_interval: Duration::from_secs(self.config.retention.sweep_interval_secs),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ServiceRepository;

    #[tokio::test]
    async fn test_open_migrates_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("nimbus.db");

        let nimbus = Nimbus::open(config, CancellationToken::new()).await.unwrap();

        assert!(nimbus.services.get_all().await.unwrap().is_empty());
        assert_eq!(nimbus.probe_deadline().timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_background_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("nimbus.db");
        let nimbus = Nimbus::open(config, CancellationToken::new()).await.unwrap();

        let sweep = nimbus.retention().start_periodic_sweep(nimbus.lifetime.clone());
        nimbus.shutdown();

        assert!(nimbus.lifetime.is_cancelled());
        tokio::time::timeout(Duration::from_secs(2), sweep).await.unwrap().unwrap();
    }
}
