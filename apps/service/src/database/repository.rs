use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Row, params};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::monitoring::types::{Service, ServiceId, ServiceStatus, UserId};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Read/write access to the services the prober watches.
///
/// The records belong to the surrounding application; the prober reads them
/// and writes only the live status fields.
#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn get_by_id(&self, id: ServiceId) -> Result<Option<Service>>;

    async fn get_all_by_user(&self, user_id: UserId) -> Result<Vec<Service>>;

    async fn get_all(&self) -> Result<Vec<Service>>;

    /// Set the status and clear the response time (no probe was dispatched)
    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<()>;

    async fn update_status_and_latency(
        &self,
        id: ServiceId,
        status: ServiceStatus,
        response_time_ms: Option<i64>,
    ) -> Result<()>;
}

const SERVICE_COLUMNS: &str = "id, user_id, name, url, description, status, response_time_ms";

/// libsql-backed service store
pub struct LibsqlServiceRepository {
    pool: LibsqlPool,
}

impl LibsqlServiceRepository {
    pub fn new(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("failed to acquire connection: {e}"))
    }

    /// Insert a service and return its id
    pub async fn create_service(
        &self,
        user_id: UserId,
        name: &str,
        url: &str,
        description: Option<&str>,
    ) -> Result<ServiceId> {
        let conn = self.get_conn().await?;
        let now = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO services (user_id, name, url, description, status, created_at, updated_at) VALUES (?, ?, ?, ?, 'unknown', ?, ?)",
            params![user_id, name, url, description, now, now],
        )
        .await
        .context("failed to insert service")?;

        Ok(conn.last_insert_rowid())
    }

    /// Delete a service; its status log goes with it through the cascade
    pub async fn delete_service(&self, id: ServiceId) -> Result<bool> {
        let conn = self.get_conn().await?;
        let affected = conn.execute("DELETE FROM services WHERE id = ?", params![id]).await?;
        Ok(affected > 0)
    }

    async fn query_services(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<Vec<Service>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, args).await?;
        let mut services = Vec::new();

        while let Some(row) = rows.next().await? {
            services.push(service_from_row(&row)?);
        }

        Ok(services)
    }
}

fn service_from_row(row: &Row) -> Result<Service> {
    let status: String = row.get(5)?;
    Ok(Service {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        description: row.get(4)?,
        status: ServiceStatus::from_db(&status),
        response_time_ms: row.get(6)?,
    })
}

#[async_trait]
impl ServiceRepository for LibsqlServiceRepository {
    async fn get_by_id(&self, id: ServiceId) -> Result<Option<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?");
        Ok(self.query_services(&sql, params![id]).await?.into_iter().next())
    }

    async fn get_all_by_user(&self, user_id: UserId) -> Result<Vec<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services WHERE user_id = ? ORDER BY id");
        self.query_services(&sql, params![user_id]).await
    }

    async fn get_all(&self) -> Result<Vec<Service>> {
        let sql = format!("SELECT {SERVICE_COLUMNS} FROM services ORDER BY id");
        self.query_services(&sql, ()).await
    }

    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<()> {
        self.update_status_and_latency(id, status, None).await
    }

    async fn update_status_and_latency(
        &self,
        id: ServiceId,
        status: ServiceStatus,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        let conn = self.get_conn().await?;
        let affected = conn
            .execute(
                "UPDATE services SET status = ?, response_time_ms = ?, updated_at = ? WHERE id = ?",
                params![status.as_str(), response_time_ms, Utc::now().timestamp_millis(), id],
            )
            .await
            .with_context(|| format!("failed to update status of service {id}"))?;

        if affected == 0 {
            anyhow::bail!("service {id} no longer exists");
        }
        Ok(())
    }
}

/// In-memory service store for tests and dry runs
#[derive(Default)]
pub struct MemoryServiceRepository {
    services: RwLock<BTreeMap<ServiceId, Service>>,
    status_writes: AtomicUsize,
}

impl MemoryServiceRepository {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: RwLock::new(services.into_iter().map(|s| (s.id, s)).collect()),
            status_writes: AtomicUsize::new(0),
        }
    }

    /// Number of live-status writes performed so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceRepository for MemoryServiceRepository {
    async fn get_by_id(&self, id: ServiceId) -> Result<Option<Service>> {
        Ok(self.services.read().await.get(&id).cloned())
    }

    async fn get_all_by_user(&self, user_id: UserId) -> Result<Vec<Service>> {
        let services = self.services.read().await;
        Ok(services.values().filter(|s| s.user_id == user_id).cloned().collect())
    }

    async fn get_all(&self) -> Result<Vec<Service>> {
        Ok(self.services.read().await.values().cloned().collect())
    }

    async fn update_status(&self, id: ServiceId, status: ServiceStatus) -> Result<()> {
        self.update_status_and_latency(id, status, None).await
    }

    async fn update_status_and_latency(
        &self,
        id: ServiceId,
        status: ServiceStatus,
        response_time_ms: Option<i64>,
    ) -> Result<()> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("service {id} no longer exists"))?;
        service.status = status;
        service.response_time_ms = response_time_ms;
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::TestDb;

    #[tokio::test]
    async fn test_libsql_repository_roundtrip() {
        let db = TestDb::new().await;
        let repo = db.services();

        let id = repo.create_service(7, "Router", "https://192.168.1.1", Some("edge")).await.unwrap();
        repo.create_service(8, "Other", "https://example.com", None).await.unwrap();

        let service = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(service.user_id, 7);
        assert_eq!(service.status, ServiceStatus::Unknown);
        assert_eq!(service.description.as_deref(), Some("edge"));

        repo.update_status_and_latency(id, ServiceStatus::Online, Some(42)).await.unwrap();
        let service = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(service.status, ServiceStatus::Online);
        assert_eq!(service.response_time_ms, Some(42));

        repo.update_status(id, ServiceStatus::Offline).await.unwrap();
        let service = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(service.status, ServiceStatus::Offline);
        assert_eq!(service.response_time_ms, None);

        assert_eq!(repo.get_all_by_user(7).await.unwrap().len(), 1);
        assert_eq!(repo.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_updating_missing_service_fails() {
        let db = TestDb::new().await;
        let repo = db.services();

        assert!(repo.update_status(404, ServiceStatus::Online).await.is_err());
        assert!(repo.get_by_id(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_repository_counts_writes() {
        let repo = MemoryServiceRepository::new([Service::new(1, 1, "a", "http://a")]);

        repo.update_status_and_latency(1, ServiceStatus::Online, Some(5)).await.unwrap();
        assert!(repo.update_status(2, ServiceStatus::Offline).await.is_err());

        assert_eq!(repo.status_writes(), 1);
        assert_eq!(repo.get_by_id(1).await.unwrap().unwrap().response_time_ms, Some(5));
    }
}
