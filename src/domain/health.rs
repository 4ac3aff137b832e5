//! Health domain types.
//!
//! Defines the four monitored units, the status of a single probe
//! report, and the rollup rule that reduces a unit's reports to one
//! status for the `/health` summary.
//!
//! Rollup policy for mixed reports:
//! - no reports at all → `KO` (nothing proves the unit healthy)
//! - every report `Deactivated` → `Deactivated`
//! - otherwise `Deactivated` reports are ignored and the worst of the
//!   remaining statuses wins, with severity `OK < Degraded < KO`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::ServiceError;

/// A monitored backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Unit {
    /// Metrics store (InfluxDB-compatible ping endpoint).
    Metrics,
    /// Distributed tracing collector.
    Tracing,
    /// Cache server speaking RESP.
    Cache,
    /// Error tracking service (Sentry-compatible DSN).
    ErrorTracker,
}

impl Unit {
    pub const ALL: [Self; 4] = [Self::Metrics, Self::Tracing, Self::Cache, Self::ErrorTracker];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Tracing => "tracing",
            Self::Cache => "cache",
            Self::ErrorTracker => "errortracker",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| ServiceError::InvalidUnit(s.to_string()))
    }
}

/// Outcome of one probe check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "KO")]
    Ko,
    Degraded,
    /// The integration is disabled by configuration.
    Deactivated,
}

impl HealthStatus {
    /// Ordering used by the rollup; `Deactivated` never competes.
    const fn severity(self) -> u8 {
        match self {
            Self::Ok | Self::Deactivated => 0,
            Self::Degraded => 1,
            Self::Ko => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Ko => "KO",
            Self::Degraded => "Degraded",
            Self::Deactivated => "Deactivated",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a check took, or "N/A" when nothing was measured.
///
/// Serialized as `"<secs>.<nanos>s"` with nine nanosecond digits, so a
/// stored report reads back exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeDuration {
    Measured(Duration),
    NotApplicable,
}

impl fmt::Display for ProbeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured(d) => write!(f, "{}.{:09}s", d.as_secs(), d.subsec_nanos()),
            Self::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl FromStr for ProbeDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "N/A" {
            return Ok(Self::NotApplicable);
        }

        let body = s
            .strip_suffix('s')
            .ok_or_else(|| format!("duration '{s}' must end with 's'"))?;
        let (secs, frac) = body.split_once('.').unwrap_or((body, ""));

        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid fractional seconds in '{s}'"));
        }

        let secs: u64 = secs
            .parse()
            .map_err(|_| format!("invalid seconds in '{s}'"))?;
        let nanos: u32 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<9}")
                .parse()
                .map_err(|_| format!("invalid fractional seconds in '{s}'"))?
        };

        Ok(Self::Measured(Duration::new(secs, nanos)))
    }
}

impl Serialize for ProbeDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProbeDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Immutable result of one probe check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Check name within the unit (e.g. `ping`).
    pub name: String,
    pub duration: ProbeDuration,
    pub status: HealthStatus,
    /// Failure description; absent when the check passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    pub fn ok(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration: ProbeDuration::Measured(duration),
            status: HealthStatus::Ok,
            error: None,
        }
    }

    pub fn ko(name: impl Into<String>, duration: ProbeDuration, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration,
            status: HealthStatus::Ko,
            error: Some(error.into()),
        }
    }

    /// Report for a backend disabled by configuration.
    pub fn deactivated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: ProbeDuration::NotApplicable,
            status: HealthStatus::Deactivated,
            error: None,
        }
    }
}

/// Latest report set for a unit as held by the report store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReport {
    pub component_name: String,
    pub component_id: String,
    pub unit: String,
    pub reports: Vec<Report>,
    pub last_updated: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Unit name → rollup status, as served by `GET /health`.
pub type AggregateSnapshot = BTreeMap<String, String>;

/// Reduce a unit's reports to a single status (see module docs).
pub fn rollup(reports: &[Report]) -> HealthStatus {
    if reports.is_empty() {
        return HealthStatus::Ko;
    }

    reports
        .iter()
        .map(|r| r.status)
        .filter(|s| *s != HealthStatus::Deactivated)
        .max_by_key(|s| s.severity())
        .unwrap_or(HealthStatus::Deactivated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: HealthStatus) -> Report {
        Report {
            name: "ping".into(),
            duration: ProbeDuration::Measured(Duration::from_millis(3)),
            status,
            error: None,
        }
    }

    #[test]
    fn test_rollup_table() {
        use HealthStatus::{Deactivated, Degraded, Ko, Ok};

        let cases: &[(&[HealthStatus], HealthStatus)] = &[
            (&[Ok, Ok], Ok),
            (&[Ok, Ko], Ko),
            (&[Ok, Degraded], Degraded),
            (&[Degraded, Ko], Ko),
            (&[Deactivated], Deactivated),
            (&[Deactivated, Deactivated], Deactivated),
            (&[Deactivated, Ok], Ok),
            (&[Deactivated, Ko], Ko),
            (&[], Ko),
        ];

        for (statuses, expected) in cases {
            let reports: Vec<Report> = statuses.iter().copied().map(report).collect();
            assert_eq!(rollup(&reports), *expected, "rollup of {statuses:?}");
        }
    }

    #[test]
    fn test_unit_parsing_rejects_unknown_names() {
        assert_eq!("cache".parse::<Unit>().unwrap(), Unit::Cache);
        assert_eq!("errortracker".parse::<Unit>().unwrap(), Unit::ErrorTracker);

        let err = "redis".parse::<Unit>().unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUnit(ref u) if u == "redis"));
        assert!("Cache".parse::<Unit>().is_err());
    }

    #[test]
    fn test_report_json_shape() {
        let json = serde_json::to_value(Report::deactivated("ping")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "ping",
                "duration": "N/A",
                "status": "Deactivated"
            })
        );

        let ko = Report::ko(
            "ping",
            ProbeDuration::Measured(Duration::new(1, 5_000)),
            "connection refused",
        );
        let json = serde_json::to_value(&ko).unwrap();
        assert_eq!(json["duration"], "1.000005000s");
        assert_eq!(json["status"], "KO");
        assert_eq!(json["error"], "connection refused");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(
            "0.25s".parse::<ProbeDuration>().unwrap(),
            ProbeDuration::Measured(Duration::from_millis(250))
        );
        assert_eq!(
            "3s".parse::<ProbeDuration>().unwrap(),
            ProbeDuration::Measured(Duration::from_secs(3))
        );
        assert!("12ms".parse::<ProbeDuration>().is_err());
        assert!("1.0000000001s".parse::<ProbeDuration>().is_err());
    }
}
