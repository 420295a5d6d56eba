use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Builder, Connection, Database, Error as LibsqlError, params};

/// Milliseconds a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct LibsqlManager {
    database: Database,
    recycle_count: AtomicU64,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database, recycle_count: AtomicU64::new(0) }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // Both pragmas answer with a row, so they go through `query`
        conn.query("PRAGMA foreign_keys = ON", ()).await?;
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ()).await?;
        Ok(conn)
    }

    async fn recycle(&self, conn: &mut Self::Type, _: &managed::Metrics) -> RecycleResult<Self::Error> {
        let probe = self.recycle_count.fetch_add(1, Ordering::Relaxed);
        let row = conn
            .query("SELECT ?1", params![probe])
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;

        if row.get::<u64>(0)? != probe {
            return Err(RecycleError::Message("connection returned a stale liveness value".into()));
        }
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) the database file at `path` and wrap it in a pool
pub async fn open_pool(path: impl AsRef<Path>, max_connections: usize) -> Result<LibsqlPool> {
    let path = path.as_ref();
    let database = Builder::new_local(path)
        .build()
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    Pool::builder(LibsqlManager::new(database))
        .max_size(max_connections.max(1))
        .build()
        .context("failed to build connection pool")
}
