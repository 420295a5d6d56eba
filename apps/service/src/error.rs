use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::monitoring::types::ServiceId;

/// Failure of a single-service check or a batch.
///
/// Probe failures never show up here, they are recorded as offline outcomes.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("failed to persist probe outcome: {0:#}")]
    Persistence(anyhow::Error),

    #[error("persisting probe outcome exceeded {}ms", .0.as_millis())]
    PersistenceTimeout(Duration),

    #[error("checker is shutting down")]
    ShuttingDown,

    #[error("failed to load services: {0:#}")]
    Repository(anyhow::Error),
}

/// Rejected or failed metrics query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown range '{0}', expected one of 1h, 6h, 24h, 7d, 30d")]
    UnknownRange(String),

    #[error("bucket width must be at least 1 minute, got {0}")]
    InvalidBucketWidth(i64),

    #[error("window start {start} is not before end {end}")]
    InvalidWindow { start: DateTime<Utc>, end: DateTime<Utc> },

    #[error("retention must be at least 1 day, got {0}")]
    InvalidRetention(i64),

    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("status store query failed: {0:#}")]
    Store(anyhow::Error),

    #[error("failed to render metrics: {0}")]
    Exposition(#[from] prometheus::Error),
}

impl QueryError {
    /// The caller sent something unusable, as opposed to a server-side failure
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownRange(_)
                | QueryError::InvalidBucketWidth(_)
                | QueryError::InvalidWindow { .. }
                | QueryError::InvalidRetention(_)
        )
    }
}
