use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Named lookback for report queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    LastSixHours,
    #[default]
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastSixHours => "6h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
            TimeRange::LastMonth => "30d",
        }
    }

    pub fn lookback(&self) -> chrono::Duration {
        match self {
            TimeRange::LastHour => chrono::Duration::hours(1),
            TimeRange::LastSixHours => chrono::Duration::hours(6),
            TimeRange::LastDay => chrono::Duration::hours(24),
            TimeRange::LastWeek => chrono::Duration::days(7),
            TimeRange::LastMonth => chrono::Duration::days(30),
        }
    }

    /// Parse an optional token, absent or blank meaning the default
    pub fn parse_or_default(token: Option<&str>) -> Result<Self, QueryError> {
        match token.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(token) => token.parse(),
        }
    }

    /// The window ending at `now`
    pub fn window_ending(&self, now: DateTime<Utc>) -> QueryWindow {
        QueryWindow { start: now - self.lookback(), end: now }
    }
}

impl FromStr for TimeRange {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::LastHour),
            "6h" => Ok(TimeRange::LastSixHours),
            "24h" => Ok(TimeRange::LastDay),
            "7d" => Ok(TimeRange::LastWeek),
            "30d" => Ok(TimeRange::LastMonth),
            other => Err(QueryError::UnknownRange(other.to_string())),
        }
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive `[start, end]` window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, QueryError> {
        if start >= end {
            return Err(QueryError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }
}

/// Chart bucket width in whole minutes, at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketWidth(u32);

impl BucketWidth {
    pub const DEFAULT_MINUTES: u32 = 5;

    pub fn from_minutes(minutes: i64) -> Result<Self, QueryError> {
        match u32::try_from(minutes) {
            Ok(m) if m >= 1 => Ok(Self(m)),
            _ => Err(QueryError::InvalidBucketWidth(minutes)),
        }
    }

    pub fn parse_or_default(minutes: Option<i64>) -> Result<Self, QueryError> {
        minutes.map_or(Ok(Self::default()), Self::from_minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }
}

impl Default for BucketWidth {
    fn default() -> Self {
        Self(Self::DEFAULT_MINUTES)
    }
}

/// Row cap for recent-activity reads; out-of-range requests are clamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityLimit(usize);

impl ActivityLimit {
    pub const DEFAULT: usize = 100;
    pub const MAX: usize = 1000;

    pub fn clamped(requested: Option<i64>) -> Self {
        match requested {
            None => Self(Self::DEFAULT),
            Some(n) => Self(n.clamp(1, Self::MAX as i64) as usize),
        }
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for ActivityLimit {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_range_tokens() {
        assert_eq!(TimeRange::parse_or_default(None).unwrap(), TimeRange::LastDay);
        assert_eq!(TimeRange::parse_or_default(Some("")).unwrap(), TimeRange::LastDay);
        assert_eq!(TimeRange::parse_or_default(Some("7d")).unwrap(), TimeRange::LastWeek);
        assert!(matches!(
            TimeRange::parse_or_default(Some("2w")),
            Err(QueryError::UnknownRange(token)) if token == "2w"
        ));
    }

    #[test]
    fn test_range_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = TimeRange::LastSixHours.window_ending(now);

        assert_eq!(window.end, now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap());
    }

    #[test]
    fn test_window_must_be_ordered() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert!(QueryWindow::new(t, t).is_err());
        assert!(QueryWindow::new(t + chrono::Duration::minutes(1), t).is_err());
        assert!(QueryWindow::new(t, t + chrono::Duration::minutes(1)).is_ok());
    }

    #[test]
    fn test_bucket_width() {
        assert_eq!(BucketWidth::parse_or_default(None).unwrap().minutes(), 5);
        assert_eq!(BucketWidth::from_minutes(15).unwrap().as_duration(), Duration::from_secs(900));
        assert!(matches!(BucketWidth::from_minutes(0), Err(QueryError::InvalidBucketWidth(0))));
        assert!(BucketWidth::from_minutes(-5).is_err());
    }

    #[test]
    fn test_activity_limit_is_clamped() {
        assert_eq!(ActivityLimit::clamped(None).get(), 100);
        assert_eq!(ActivityLimit::clamped(Some(0)).get(), 1);
        assert_eq!(ActivityLimit::clamped(Some(-3)).get(), 1);
        assert_eq!(ActivityLimit::clamped(Some(250)).get(), 250);
        assert_eq!(ActivityLimit::clamped(Some(50_000)).get(), 1000);
    }
}
