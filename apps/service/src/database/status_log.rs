use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params;
use std::time::Duration;

use super::models::{
    NewStatusLog, StatusBucket, StatusLogEntry, WindowStats, from_epoch_ms, to_epoch_ms, uptime_percent,
};
use crate::monitoring::types::{ServiceId, ServiceStatus};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Append-only time series of probe outcomes.
///
/// Windows are inclusive on both ends: `start <= checked_at <= end`.
#[async_trait]
pub trait StatusLogStore: Send + Sync {
    async fn append(&self, entry: &NewStatusLog) -> Result<i64>;

    /// Most recent entries first, at most `limit`
    async fn recent(&self, service_id: ServiceId, limit: usize) -> Result<Vec<StatusLogEntry>>;

    async fn window_stats(
        &self,
        service_id: ServiceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats>;

    /// Non-empty buckets of `width`, ordered by bucket start
    async fn bucketed(
        &self,
        service_id: ServiceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        width: Duration,
    ) -> Result<Vec<StatusBucket>>;

    /// Delete every entry older than `cutoff`, returning how many went
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_all_for(&self, service_id: ServiceId) -> Result<u64>;
}

pub struct LibsqlStatusLogStore {
    pool: LibsqlPool,
}

impl LibsqlStatusLogStore {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("failed to acquire connection: {e}"))
    }
}

#[async_trait]
impl StatusLogStore for LibsqlStatusLogStore {
    async fn append(&self, entry: &NewStatusLog) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO status_logs (service_id, status, response_time_ms, status_code, error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                entry.service_id,
                entry.status.as_str(),
                entry.response_time_ms,
                entry.status_code.map(i64::from),
                entry.error_message.clone(),
                to_epoch_ms(entry.checked_at)
            ],
        )
        .await
        .with_context(|| format!("failed to append status log for service {}", entry.service_id))?;

        Ok(conn.last_insert_rowid())
    }

    async fn recent(&self, service_id: ServiceId, limit: usize) -> Result<Vec<StatusLogEntry>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = conn
            .query(
                "SELECT id, service_id, status, response_time_ms, status_code, error_message, checked_at
                 FROM status_logs WHERE service_id = ? ORDER BY checked_at DESC, id DESC LIMIT ?",
                params![service_id, limit],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(2)?;
            entries.push(StatusLogEntry {
                id: row.get(0)?,
                service_id: row.get(1)?,
                status: ServiceStatus::from_db(&status),
                response_time_ms: row.get(3)?,
                status_code: row.get::<Option<i64>>(4)?.and_then(|code| u16::try_from(code).ok()),
                error_message: row.get(5)?,
                checked_at: from_epoch_ms(row.get(6)?),
            });
        }

        Ok(entries)
    }

    async fn window_stats(
        &self,
        service_id: ServiceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'online' THEN 1 ELSE 0 END), 0),
                        AVG(response_time_ms),
                        MIN(response_time_ms),
                        MAX(response_time_ms)
                 FROM status_logs WHERE service_id = ? AND checked_at >= ? AND checked_at <= ?",
                params![service_id, to_epoch_ms(start), to_epoch_ms(end)],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(WindowStats::default());
        };

        let total_checks: i64 = row.get(0)?;
        let online_count: i64 = row.get(1)?;
        Ok(WindowStats {
            total_checks,
            online_count,
            offline_count: total_checks - online_count,
            uptime_percent: uptime_percent(online_count, total_checks),
            avg_response_time_ms: row.get(2)?,
            min_response_time_ms: row.get(3)?,
            max_response_time_ms: row.get(4)?,
        })
    }

    async fn bucketed(
        &self,
        service_id: ServiceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        width: Duration,
    ) -> Result<Vec<StatusBucket>> {
        let width_ms = i64::try_from(width.as_millis()).unwrap_or(i64::MAX);
        ensure!(width_ms > 0, "bucket width must be positive");

        let start_ms = to_epoch_ms(start);
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT (checked_at - ?1) / ?2 AS bucket,
                        COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'online' THEN 1 ELSE 0 END), 0),
                        AVG(response_time_ms)
                 FROM status_logs
                 WHERE service_id = ?3 AND checked_at >= ?1 AND checked_at <= ?4
                 GROUP BY bucket ORDER BY bucket",
                params![start_ms, width_ms, service_id, to_epoch_ms(end)],
            )
            .await?;

        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            let index: i64 = row.get(0)?;
            let total_checks: i64 = row.get(1)?;
            let online_count: i64 = row.get(2)?;
            buckets.push(StatusBucket {
                bucket_start: from_epoch_ms(start_ms.saturating_add(index.saturating_mul(width_ms))),
                total_checks,
                online_count,
                uptime_percent: uptime_percent(online_count, total_checks),
                avg_response_time_ms: row.get(3)?,
            });
        }

        Ok(buckets)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM status_logs WHERE checked_at < ?", params![to_epoch_ms(cutoff)])
            .await
            .context("failed to prune status logs")?;
        Ok(deleted)
    }

    async fn delete_all_for(&self, service_id: ServiceId) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM status_logs WHERE service_id = ?", params![service_id])
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repository::ServiceRepository;
    use crate::database::test_support::TestDb;
    use chrono::TimeZone;

    fn at(minute: i64, second: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(minute * 60 + second)
    }

    fn log(service_id: ServiceId, status: ServiceStatus, latency: Option<i64>, checked_at: DateTime<Utc>) -> NewStatusLog {
        NewStatusLog {
            service_id,
            status,
            response_time_ms: latency,
            status_code: latency.map(|_| 200),
            error_message: (status == ServiceStatus::Offline).then(|| "HTTP 500".to_string()),
            checked_at,
        }
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;
        let store = db.status_logs();

        for minute in 0..5 {
            store.append(&log(service, ServiceStatus::Online, Some(minute), at(minute, 0))).await.unwrap();
        }

        let entries = store.recent(service, 3).await.unwrap();
        let latencies: Vec<_> = entries.iter().map(|e| e.response_time_ms).collect();
        assert_eq!(latencies, vec![Some(4), Some(3), Some(2)]);
        assert_eq!(entries[0].checked_at, at(4, 0));
        assert_eq!(entries[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn test_window_stats_empty_window_has_zero_uptime() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;

        let stats = db.status_logs().window_stats(service, at(0, 0), at(60, 0)).await.unwrap();

        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.uptime_percent, 0.0);
        assert_eq!(stats.avg_response_time_ms, None);
    }

    #[tokio::test]
    async fn test_window_stats_counts_and_latency() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;
        let store = db.status_logs();

        store.append(&log(service, ServiceStatus::Online, Some(10), at(1, 0))).await.unwrap();
        store.append(&log(service, ServiceStatus::Online, Some(30), at(2, 0))).await.unwrap();
        store.append(&log(service, ServiceStatus::Offline, None, at(3, 0))).await.unwrap();
        store.append(&log(service, ServiceStatus::Online, Some(20), at(4, 0))).await.unwrap();
        // outside the window
        store.append(&log(service, ServiceStatus::Offline, Some(999), at(90, 0))).await.unwrap();

        let stats = store.window_stats(service, at(1, 0), at(4, 0)).await.unwrap();

        assert_eq!(stats.total_checks, 4);
        assert_eq!(stats.online_count, 3);
        assert_eq!(stats.offline_count, 1);
        assert_eq!(stats.uptime_percent, 75.0);
        assert_eq!(stats.avg_response_time_ms, Some(20.0));
        assert_eq!(stats.min_response_time_ms, Some(10));
        assert_eq!(stats.max_response_time_ms, Some(30));
    }

    #[tokio::test]
    async fn test_bucketed_groups_by_width_and_skips_empty_buckets() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;
        let store = db.status_logs();

        store.append(&log(service, ServiceStatus::Online, Some(10), at(0, 10))).await.unwrap();
        store.append(&log(service, ServiceStatus::Offline, Some(30), at(4, 59))).await.unwrap();
        store.append(&log(service, ServiceStatus::Online, Some(50), at(12, 0))).await.unwrap();

        let buckets = store
            .bucketed(service, at(0, 0), at(30, 0), Duration::from_secs(5 * 60))
            .await
            .unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, at(0, 0));
        assert_eq!(buckets[0].total_checks, 2);
        assert_eq!(buckets[0].online_count, 1);
        assert_eq!(buckets[0].uptime_percent, 50.0);
        assert_eq!(buckets[0].avg_response_time_ms, Some(20.0));
        assert_eq!(buckets[1].bucket_start, at(10, 0));
        assert_eq!(buckets[1].uptime_percent, 100.0);
    }

    #[tokio::test]
    async fn test_bucketed_rejects_zero_width() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;

        let result = db.status_logs().bucketed(service, at(0, 0), at(1, 0), Duration::ZERO).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_prune_is_exact_and_idempotent() {
        let db = TestDb::new().await;
        let service = db.seed_service(1, "http://a").await;
        let store = db.status_logs();

        for minute in 0..6 {
            store.append(&log(service, ServiceStatus::Online, Some(1), at(minute, 0))).await.unwrap();
        }

        assert_eq!(store.prune_older_than(at(3, 0)).await.unwrap(), 3);
        assert_eq!(store.prune_older_than(at(3, 0)).await.unwrap(), 0);

        let remaining = store.recent(service, 100).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|e| e.checked_at >= at(3, 0)));
    }

    #[tokio::test]
    async fn test_deleting_service_cascades_to_log() {
        let db = TestDb::new().await;
        let doomed = db.seed_service(1, "http://a").await;
        let kept = db.seed_service(1, "http://b").await;
        let store = db.status_logs();

        store.append(&log(doomed, ServiceStatus::Online, Some(1), at(0, 0))).await.unwrap();
        store.append(&log(kept, ServiceStatus::Online, Some(1), at(0, 0))).await.unwrap();

        assert!(db.services().delete_service(doomed).await.unwrap());
        assert!(db.services().get_by_id(doomed).await.unwrap().is_none());
        assert!(store.recent(doomed, 10).await.unwrap().is_empty());
        assert_eq!(store.recent(kept, 10).await.unwrap().len(), 1);
        assert_eq!(store.delete_all_for(kept).await.unwrap(), 1);
    }
}
