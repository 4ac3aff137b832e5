//! Report Store - Atomic JSON Health Report Table
//!
//! Implements the `ReportStore` port as a single table persisted to
//! `health_reports.json`. Rows are keyed by (component name,
//! component ID, unit) and hold the JSON-encoded report payload with
//! `last_updated` and `valid_until` timestamps.
//!
//! Every write goes to a temporary file first and is then renamed
//! over the table, so the file on disk is always either the old or
//! the new version. A mutex serializes read-modify-write cycles,
//! which makes each row change atomic: a sweep racing an update can
//! only remove rows that were already expired when it ran.
//!
//! An instance owns only its own rows. Before every write the table
//! is re-read and the other instances' rows are taken from disk, so
//! instances sharing a data directory keep each other's rows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{Report, ServiceError, StoredReport, Unit};
use crate::ports::{Clock, ReportStore};

const TABLE_FILE: &str = "health_reports.json";

/// One persisted row.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportRow {
    component_name: String,
    component_id: String,
    unit: String,
    /// JSON array of `Report`.
    payload: String,
    last_updated: DateTime<Utc>,
    valid_until: DateTime<Utc>,
}

/// (component_name, component_id, unit)
type RowKey = (String, String, String);

/// On-disk table layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ReportTable {
    rows: Vec<ReportRow>,
}

/// File-backed report store for one component instance.
pub struct FileReportStore {
    component_name: String,
    component_id: String,
    table_path: PathBuf,
    tmp_path: PathBuf,
    rows: Mutex<BTreeMap<RowKey, ReportRow>>,
    clock: Arc<dyn Clock>,
}

impl FileReportStore {
    /// Open (or create) the table in `data_dir`.
    ///
    /// Rows already on disk are loaded. Rows of other component
    /// instances are refreshed from disk before every write.
    pub async fn open(
        data_dir: &str,
        component_name: &str,
        component_id: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        let table_path = dir.join(TABLE_FILE);
        let tmp_path = dir.join(format!("{TABLE_FILE}.{component_name}.{component_id}.tmp"));
        let rows = load_rows(&table_path).await?;

        info!(
            path = %table_path.display(),
            rows = rows.len(),
            component = component_name,
            component_id,
            "Health report table opened"
        );

        Ok(Self {
            component_name: component_name.to_string(),
            component_id: component_id.to_string(),
            table_path,
            tmp_path,
            rows: Mutex::new(rows),
            clock,
        })
    }

    fn key(&self, unit: Unit) -> RowKey {
        (
            self.component_name.clone(),
            self.component_id.clone(),
            unit.to_string(),
        )
    }

    fn owns(&self, row: &ReportRow) -> bool {
        row.component_name == self.component_name && row.component_id == self.component_id
    }

    fn storage_error(&self, unit: &str, err: anyhow::Error) -> ServiceError {
        ServiceError::storage(
            format!("{}/{}", self.component_name, self.component_id),
            unit,
            err,
        )
    }

    /// Replace other instances' rows with what is on disk now.
    ///
    /// Must run under the row lock, right before `persist`.
    async fn refresh_foreign(&self, rows: &mut BTreeMap<RowKey, ReportRow>) -> Result<()> {
        let on_disk = load_rows(&self.table_path).await?;
        rows.retain(|_, row| self.owns(row));
        rows.extend(on_disk.into_iter().filter(|(_, row)| !self.owns(row)));
        Ok(())
    }

    /// Write the whole table atomically (tmp → rename).
    async fn persist(&self, rows: &BTreeMap<RowKey, ReportRow>) -> Result<()> {
        let table = ReportTable {
            rows: rows.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&table)
            .context("Failed to serialize report table")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp report table")?;

        fs::rename(&self.tmp_path, &self.table_path)
            .await
            .context("Failed to rename report table")?;

        Ok(())
    }
}

async fn load_rows(path: &Path) -> Result<BTreeMap<RowKey, ReportRow>> {
    if !fs::try_exists(path)
        .await
        .context("Failed to stat report table")?
    {
        return Ok(BTreeMap::new());
    }

    let json = fs::read_to_string(path)
        .await
        .context("Failed to read report table")?;
    let table: ReportTable =
        serde_json::from_str(&json).context("Failed to parse report table")?;

    Ok(table
        .rows
        .into_iter()
        .map(|row| {
            let key = (
                row.component_name.clone(),
                row.component_id.clone(),
                row.unit.clone(),
            );
            (key, row)
        })
        .collect())
}

#[async_trait]
impl ReportStore for FileReportStore {
    #[instrument(skip_all, fields(unit = %unit))]
    async fn update(
        &self,
        unit: Unit,
        reports: &[Report],
        validity: Duration,
    ) -> Result<(), ServiceError> {
        let validity = chrono::Duration::from_std(validity)
            .context("Validity window out of range")
            .map_err(|e| self.storage_error(unit.as_str(), e))?;
        let payload = serde_json::to_string(reports)
            .context("Failed to serialize reports")
            .map_err(|e| self.storage_error(unit.as_str(), e))?;

        let key = self.key(unit);
        let mut rows = self.rows.lock().await;
        self.refresh_foreign(&mut rows)
            .await
            .map_err(|e| self.storage_error(unit.as_str(), e))?;

        let now = self.clock.now();
        let valid_until = now
            .checked_add_signed(validity)
            .context("Validity window overflows the calendar")
            .map_err(|e| self.storage_error(unit.as_str(), e))?;
        let row = ReportRow {
            component_name: self.component_name.clone(),
            component_id: self.component_id.clone(),
            unit: unit.to_string(),
            payload,
            last_updated: now,
            valid_until,
        };

        let previous = rows.insert(key.clone(), row);
        if let Err(e) = self.persist(&rows).await {
            // keep memory identical to disk
            match previous {
                Some(old) => rows.insert(key, old),
                None => rows.remove(&key),
            };
            return Err(self.storage_error(unit.as_str(), e));
        }

        debug!(valid_until = %valid_until, "Health reports stored");
        Ok(())
    }

    async fn read(&self, unit: Unit) -> Result<StoredReport, ServiceError> {
        let row = {
            let rows = self.rows.lock().await;
            rows.get(&self.key(unit)).cloned()
        };

        let Some(row) = row else {
            return Err(ServiceError::NotFound {
                unit: unit.to_string(),
            });
        };

        if self.clock.now() > row.valid_until {
            return Err(ServiceError::Expired {
                unit: row.unit,
                valid_until: row.valid_until,
            });
        }

        let reports: Vec<Report> = serde_json::from_str(&row.payload)
            .context("Failed to decode stored reports")
            .map_err(|e| self.storage_error(unit.as_str(), e))?;

        Ok(StoredReport {
            component_name: row.component_name,
            component_id: row.component_id,
            unit: row.unit,
            reports,
            last_updated: row.last_updated,
            valid_until: row.valid_until,
        })
    }

    #[instrument(skip(self))]
    async fn clean(&self) -> Result<usize, ServiceError> {
        let mut rows = self.rows.lock().await;
        self.refresh_foreign(&mut rows)
            .await
            .map_err(|e| self.storage_error("*", e))?;
        let now = self.clock.now();

        let expired: Vec<RowKey> = rows
            .iter()
            .filter(|(_, row)| self.owns(row) && row.valid_until < now)
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let removed: Vec<(RowKey, ReportRow)> = expired
            .into_iter()
            .filter_map(|key| rows.remove_entry(&key))
            .collect();

        if let Err(e) = self.persist(&rows).await {
            warn!(error = %e, "Sweep could not be persisted, rows kept");
            rows.extend(removed);
            return Err(self.storage_error("*", e));
        }

        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::{HealthStatus, ProbeDuration};

    /// Clock that only moves when told to.
    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(secs: i64) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(Utc.timestamp_opt(secs, 0).unwrap())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::from_std(by).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn reports() -> Vec<Report> {
        vec![
            Report::ok("ping", Duration::new(0, 1_234_567)),
            Report::ko(
                "write",
                ProbeDuration::Measured(Duration::from_millis(5)),
                "timeout",
            ),
        ]
    }

    async fn store(dir: &tempfile::TempDir, clock: Arc<ManualClock>) -> FileReportStore {
        FileReportStore::open(dir.path().to_str().unwrap(), "flaki", "flaki-1", clock)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let store = store(&dir, Arc::clone(&clock)).await;

        store
            .update(Unit::Metrics, &reports(), Duration::from_secs(60))
            .await
            .unwrap();

        let stored = store.read(Unit::Metrics).await.unwrap();
        assert_eq!(stored.reports, reports());
        assert_eq!(stored.unit, "metrics");
        assert_eq!(stored.component_name, "flaki");
        assert_eq!(stored.component_id, "flaki-1");
        assert_eq!(
            stored.valid_until - stored.last_updated,
            chrono::Duration::seconds(60)
        );
    }

    #[tokio::test]
    async fn test_missing_row_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, ManualClock::at(0)).await;

        let err = store.read(Unit::Cache).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_expired_row_stays_until_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let store = store(&dir, Arc::clone(&clock)).await;

        store
            .update(Unit::Cache, &reports(), Duration::from_secs(10))
            .await
            .unwrap();

        // exactly at the deadline the row is still current
        clock.advance(Duration::from_secs(10));
        assert!(store.read(Unit::Cache).await.is_ok());

        clock.advance(Duration::from_millis(1));
        let err = store.read(Unit::Cache).await.unwrap_err();
        assert!(matches!(err, ServiceError::Expired { .. }));
        assert_eq!(store.rows.lock().await.len(), 1);

        assert_eq!(store.clean().await.unwrap(), 1);
        assert!(matches!(
            store.read(Unit::Cache).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        // idempotent
        assert_eq!(store.clean().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clean_keeps_fresh_rows() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let store = store(&dir, Arc::clone(&clock)).await;

        store
            .update(Unit::Cache, &reports(), Duration::from_secs(5))
            .await
            .unwrap();
        store
            .update(Unit::Metrics, &reports(), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(30));
        // refreshed after expiry, before the sweep
        store
            .update(Unit::Cache, &reports(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(store.clean().await.unwrap(), 0);
        assert!(store.read(Unit::Cache).await.is_ok());
        assert!(store.read(Unit::Metrics).await.is_ok());
    }

    #[tokio::test]
    async fn test_rows_survive_reopen_and_foreign_rows_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);

        {
            let other = FileReportStore::open(
                dir.path().to_str().unwrap(),
                "flaki",
                "flaki-2",
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .await
            .unwrap();
            other
                .update(Unit::Tracing, &[Report::deactivated("ping")], Duration::from_secs(1))
                .await
                .unwrap();
        }

        let store = store(&dir, Arc::clone(&clock)).await;
        store
            .update(Unit::Metrics, &reports(), Duration::from_secs(60))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(5));
        // the other instance's expired row is not ours to sweep
        assert_eq!(store.clean().await.unwrap(), 0);

        let reopened = FileReportStore::open(
            dir.path().to_str().unwrap(),
            "flaki",
            "flaki-2",
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .await
        .unwrap();
        let err = reopened.read(Unit::Tracing).await.unwrap_err();
        assert!(matches!(err, ServiceError::Expired { .. }));
        assert_eq!(reopened.clean().await.unwrap(), 1);

        let stored = store.read(Unit::Metrics).await.unwrap();
        assert_eq!(stored.reports[0].status, HealthStatus::Ok);
    }

    #[tokio::test]
    async fn test_window_past_calendar_end_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let store = store(&dir, Arc::clone(&clock)).await;

        let err = store
            .update(
                Unit::Cache,
                &[Report::deactivated("ping")],
                Duration::from_secs(1_000_000_000_000_000),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage { .. }));

        // nothing half-written, and the store keeps working
        assert!(matches!(
            store.read(Unit::Cache).await.unwrap_err(),
            ServiceError::NotFound { .. }
        ));
        store
            .update(Unit::Cache, &reports(), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.read(Unit::Cache).await.is_ok());
    }

    #[tokio::test]
    async fn test_instances_writing_in_turn_keep_each_others_rows() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let open = |id: &'static str| {
            let dir = dir.path().to_str().unwrap().to_string();
            let clock = Arc::clone(&clock) as Arc<dyn Clock>;
            async move { FileReportStore::open(&dir, "flaki", id, clock).await }
        };

        // both open before either writes
        let a = open("a").await.unwrap();
        let b = open("b").await.unwrap();

        b.update(Unit::Cache, &reports(), Duration::from_secs(60))
            .await
            .unwrap();
        a.update(Unit::Cache, &[Report::deactivated("ping")], Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(a.clean().await.unwrap(), 0);

        let b = open("b").await.unwrap();
        assert_eq!(b.read(Unit::Cache).await.unwrap().reports, reports());
        let a = open("a").await.unwrap();
        assert_eq!(
            a.read(Unit::Cache).await.unwrap().reports,
            vec![Report::deactivated("ping")]
        );
    }

    #[tokio::test]
    async fn test_update_racing_clean_survives() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::at(1_700_000_000);
        let store = store(&dir, Arc::clone(&clock)).await;

        store
            .update(Unit::Cache, &reports(), Duration::from_secs(5))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(6));
        assert!(matches!(
            store.read(Unit::Cache).await.unwrap_err(),
            ServiceError::Expired { .. }
        ));

        let fresh = reports();
        let (updated, cleaned) = tokio::join!(
            store.update(Unit::Cache, &fresh, Duration::from_secs(5)),
            store.clean(),
        );
        updated.unwrap();
        // the sweep saw either the expired row or the fresh one
        assert!(cleaned.unwrap() <= 1);

        let stored = store.read(Unit::Cache).await.unwrap();
        assert_eq!(stored.reports, reports());
        assert_eq!(stored.last_updated, clock.now());
    }
}
