//! Persistence for services and their status history, backed by libsql.

pub mod migrations;
pub mod models;
pub mod repository;
pub mod status_log;

pub use repository::{LibsqlServiceRepository, MemoryServiceRepository, ServiceRepository};
pub use status_log::{LibsqlStatusLogStore, StatusLogStore};

use anyhow::Result;

use crate::pool::LibsqlPool;

/// Run pending migrations on a pooled connection
pub async fn initialize_database(pool: &LibsqlPool) -> Result<()> {
    let conn = pool.get().await.map_err(|e| anyhow::anyhow!("failed to acquire connection: {e}"))?;
    migrations::run_migrations(&conn).await
}
