use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of a monitored service
pub type ServiceId = i64;

/// Identifier of the user owning a service
pub type UserId = i64;

/// Live status of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Online => "online",
            ServiceStatus::Offline => "offline",
        }
    }

    /// Parse a stored status column, anything unexpected is `Unknown`
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "online" => ServiceStatus::Online,
            "offline" => ServiceStatus::Offline,
            _ => ServiceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored service.
///
/// The record is owned by the surrounding application; the prober only ever
/// writes `status` and `response_time_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub user_id: UserId,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub status: ServiceStatus,
    pub response_time_ms: Option<i64>,
}

impl Service {
    /// Create a service that has never been probed
    pub fn new(id: ServiceId, user_id: UserId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            name: name.into(),
            url: url.into(),
            description: None,
            status: ServiceStatus::Unknown,
            response_time_ms: None,
        }
    }
}

/// Reason a probe did not count as online
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    /// The request could not be built, nothing was sent
    #[error("{0}")]
    Construction(String),

    /// DNS, connect, TLS or protocol failure
    #[error("{0}")]
    Transport(String),

    /// The endpoint answered with an error status
    #[error("HTTP {0}")]
    Http(u16),

    #[error("probe timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("probe cancelled")]
    Cancelled,
}

/// Classified result of a single probe, ready to be persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub service_id: ServiceId,
    pub status: ServiceStatus,
    /// Elapsed probe time, absent only when no request was dispatched
    pub response_time_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// The endpoint answered with a 2xx or 3xx status
    pub fn online(service_id: ServiceId, elapsed: Duration, status_code: u16) -> Self {
        Self {
            service_id,
            status: ServiceStatus::Online,
            response_time_ms: Some(duration_to_ms(elapsed)),
            status_code: Some(status_code),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// The probe failed; `elapsed` is `None` when nothing was dispatched
    pub fn offline(service_id: ServiceId, elapsed: Option<Duration>, failure: ProbeFailure) -> Self {
        let status_code = match failure {
            ProbeFailure::Http(code) => Some(code),
            _ => None,
        };

        Self {
            service_id,
            status: ServiceStatus::Offline,
            response_time_ms: elapsed.map(duration_to_ms),
            status_code,
            error: Some(failure.to_string()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ServiceStatus::Online
    }
}

fn duration_to_ms(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// Render an error with its whole `source()` chain.
///
/// reqwest hides the interesting part ("connection refused", certificate
/// errors) behind a generic top-level message.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
