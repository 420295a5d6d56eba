//! Read-side aggregation over live service state and the status log.

pub mod exposition;
pub mod query;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{StatusBucket, StatusLogEntry, WindowStats};
use crate::database::{ServiceRepository, StatusLogStore};
use crate::error::QueryError;
use crate::monitoring::types::{Service, ServiceId, ServiceStatus, UserId};

pub use exposition::EXPOSITION_CONTENT_TYPE;
pub use query::{ActivityLimit, BucketWidth, QueryWindow, TimeRange};

/// Which services a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotScope {
    All,
    User(UserId),
}

/// Per-service line of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceMetric {
    pub service_id: ServiceId,
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    pub online: bool,
    /// Last recorded response time, 0 when none was recorded
    pub response_time_ms: i64,
}

impl From<&Service> for ServiceMetric {
    fn from(service: &Service) -> Self {
        Self {
            service_id: service.id,
            name: service.name.clone(),
            url: service.url.clone(),
            status: service.status,
            online: service.status == ServiceStatus::Online,
            response_time_ms: service.response_time_ms.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub services: Vec<ServiceMetric>,
    pub total_services: usize,
    pub online_services: usize,
    pub offline_services: usize,
    pub unknown_services: usize,
    pub generated_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn from_metrics(services: Vec<ServiceMetric>) -> Self {
        let count = |status: ServiceStatus| services.iter().filter(|s| s.status == status).count();
        let online_services = count(ServiceStatus::Online);
        let offline_services = count(ServiceStatus::Offline);
        let unknown_services = count(ServiceStatus::Unknown);

        Self {
            total_services: services.len(),
            online_services,
            offline_services,
            unknown_services,
            services,
            generated_at: Utc::now(),
        }
    }
}

/// Windowed statistics plus the chart series for one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub service_id: ServiceId,
    pub range: Option<TimeRange>,
    pub window: QueryWindow,
    pub bucket_minutes: u32,
    pub stats: WindowStats,
    pub buckets: Vec<StatusBucket>,
}

pub struct MetricsAggregator {
    services: Arc<dyn ServiceRepository>,
    logs: Arc<dyn StatusLogStore>,
}

impl MetricsAggregator {
    pub fn new(services: Arc<dyn ServiceRepository>, logs: Arc<dyn StatusLogStore>) -> Self {
        Self { services, logs }
    }

    pub async fn snapshot(&self, scope: SnapshotScope) -> Result<MetricsSnapshot, QueryError> {
        let services = match scope {
            SnapshotScope::All => self.services.get_all().await,
            SnapshotScope::User(user_id) => self.services.get_all_by_user(user_id).await,
        }
        .map_err(QueryError::Store)?;

        Ok(MetricsSnapshot::from_metrics(services.iter().map(ServiceMetric::from).collect()))
    }

    /// Exposition text for `scope`; a failure yields an error, never partial text
    pub async fn render_exposition(&self, scope: SnapshotScope) -> Result<String, QueryError> {
        let snapshot = self.snapshot(scope).await?;
        Ok(exposition::render(&snapshot)?)
    }

    pub async fn recent_activity(
        &self,
        service_id: ServiceId,
        limit: ActivityLimit,
    ) -> Result<Vec<StatusLogEntry>, QueryError> {
        self.require_service(service_id).await?;
        self.logs.recent(service_id, limit.get()).await.map_err(QueryError::Store)
    }

    /// Report over the `range` ending now
    pub async fn service_report(
        &self,
        service_id: ServiceId,
        range: TimeRange,
        bucket: BucketWidth,
    ) -> Result<ServiceReport, QueryError> {
        let mut report = self.report_for_window(service_id, range.window_ending(Utc::now()), bucket).await?;
        report.range = Some(range);
        Ok(report)
    }

    pub async fn report_for_window(
        &self,
        service_id: ServiceId,
        window: QueryWindow,
        bucket: BucketWidth,
    ) -> Result<ServiceReport, QueryError> {
        let window = QueryWindow::new(window.start, window.end)?;
        self.require_service(service_id).await?;

        let stats = self
            .logs
            .window_stats(service_id, window.start, window.end)
            .await
            .map_err(QueryError::Store)?;
        let buckets = self
            .logs
            .bucketed(service_id, window.start, window.end, bucket.as_duration())
            .await
            .map_err(QueryError::Store)?;

        Ok(ServiceReport {
            service_id,
            range: None,
            window,
            bucket_minutes: bucket.minutes(),
            stats,
            buckets,
        })
    }

    async fn require_service(&self, service_id: ServiceId) -> Result<Service, QueryError> {
        self.services
            .get_by_id(service_id)
            .await
            .map_err(QueryError::Store)?
            .ok_or(QueryError::ServiceNotFound(service_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewStatusLog;
    use crate::database::test_support::TestDb;
    use chrono::{Duration, TimeZone};

    async fn aggregator(db: &TestDb) -> MetricsAggregator {
        MetricsAggregator::new(Arc::new(db.services()), Arc::new(db.status_logs()))
    }

    #[tokio::test]
    async fn test_snapshot_counts_and_scoping() {
        let db = TestDb::new().await;
        let repo = db.services();
        let a = db.seed_service(1, "https://a.example").await;
        let b = db.seed_service(1, "https://b.example").await;
        db.seed_service(2, "https://c.example").await;
        repo.update_status_and_latency(a, ServiceStatus::Online, Some(12)).await.unwrap();
        repo.update_status(b, ServiceStatus::Offline).await.unwrap();

        let agg = aggregator(&db).await;
        let all = agg.snapshot(SnapshotScope::All).await.unwrap();
        assert_eq!(all.total_services, 3);
        assert_eq!(all.online_services, 1);
        assert_eq!(all.offline_services, 1);
        assert_eq!(all.unknown_services, 1);

        let mine = agg.snapshot(SnapshotScope::User(1)).await.unwrap();
        assert_eq!(mine.total_services, 2);
        let offline = mine.services.iter().find(|s| s.service_id == b).unwrap();
        assert_eq!(offline.response_time_ms, 0);
        assert!(!offline.online);
    }

    #[tokio::test]
    async fn test_report_over_explicit_window() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "https://a.example").await;
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let logs = db.status_logs();
        for (minute, status) in [(1, ServiceStatus::Online), (2, ServiceStatus::Offline), (7, ServiceStatus::Online)] {
            logs.append(&NewStatusLog {
                service_id: service,
                status,
                response_time_ms: Some(100),
                status_code: None,
                error_message: None,
                checked_at: start + Duration::minutes(minute),
            })
            .await
            .unwrap();
        }

        let window = QueryWindow::new(start, start + Duration::hours(1)).unwrap();
        let report = aggregator(&db)
            .await
            .report_for_window(service, window, BucketWidth::default())
            .await
            .unwrap();

        assert_eq!(report.stats.total_checks, 3);
        assert_eq!(report.buckets.len(), 2);
        assert_eq!(report.buckets[0].uptime_percent, 50.0);
        assert_eq!(report.bucket_minutes, 5);
    }

    #[tokio::test]
    async fn test_unknown_service_is_reported() {
        let db = TestDb::new().await;
        let agg = aggregator(&db).await;

        let activity = agg.recent_activity(99, ActivityLimit::default()).await;
        let report = agg.service_report(99, TimeRange::default(), BucketWidth::default()).await;

        assert!(matches!(activity, Err(QueryError::ServiceNotFound(99))));
        assert!(matches!(report, Err(QueryError::ServiceNotFound(99))));
    }

    #[tokio::test]
    async fn test_report_without_history_is_empty() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "https://a.example").await;

        let report = aggregator(&db)
            .await
            .service_report(service, TimeRange::LastHour, BucketWidth::default())
            .await
            .unwrap();

        assert_eq!(report.range, Some(TimeRange::LastHour));
        assert_eq!(report.stats.uptime_percent, 0.0);
        assert!(report.buckets.is_empty());
    }

    #[tokio::test]
    async fn test_render_exposition_uses_live_state() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "https://a.example").await;
        db.services().update_status_and_latency(service, ServiceStatus::Online, Some(8)).await.unwrap();

        let text = aggregator(&db).await.render_exposition(SnapshotScope::All).await.unwrap();

        assert!(text.contains("nimbus_online_services 1"));
        assert!(text.contains("nimbus_service_response_time_milliseconds{"));
    }
}
