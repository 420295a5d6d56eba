use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::{ProbeOutcome, ServiceId, ServiceStatus};

/// Convert a timestamp to the stored epoch-millisecond form
pub fn to_epoch_ms(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert a stored epoch-millisecond value back to a timestamp
pub fn from_epoch_ms(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// A status log row about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatusLog {
    pub service_id: ServiceId,
    pub status: ServiceStatus,
    pub response_time_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<&ProbeOutcome> for NewStatusLog {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            service_id: outcome.service_id,
            status: outcome.status,
            response_time_ms: outcome.response_time_ms,
            status_code: outcome.status_code,
            error_message: outcome.error.clone(),
            checked_at: outcome.checked_at,
        }
    }
}

/// Immutable history row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub id: i64,
    pub service_id: ServiceId,
    pub status: ServiceStatus,
    pub response_time_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Aggregate over a `[start, end]` window of one service's log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub total_checks: i64,
    pub online_count: i64,
    pub offline_count: i64,
    /// `100 * online / total`, 0 when the window is empty
    pub uptime_percent: f64,
    pub avg_response_time_ms: Option<f64>,
    pub min_response_time_ms: Option<i64>,
    pub max_response_time_ms: Option<i64>,
}

/// One non-empty chart bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusBucket {
    pub bucket_start: DateTime<Utc>,
    pub total_checks: i64,
    pub online_count: i64,
    pub uptime_percent: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// Share of online checks in percent, never dividing by zero
pub fn uptime_percent(online: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (online as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}
