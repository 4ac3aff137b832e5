//! Report Store Port - Expiring Health Report Cache
//!
//! Remembers the latest report set per unit with a validity deadline
//! so health reads do not hit the backends. Rows are keyed by
//! (component name, component ID, unit).

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Report, ServiceError, StoredReport, Unit};

/// Persistent staleness cache for health reports.
#[async_trait]
pub trait ReportStore: Send + Sync + 'static {
  /// Upsert the unit's row with `valid_until = now + validity`.
  ///
  /// # Errors
  /// Returns `ServiceError::Storage` when the write fails; the
  /// previously stored row is left intact.
  async fn update(
    &self,
    unit: Unit,
    reports: &[Report],
    validity: Duration,
  ) -> Result<(), ServiceError>;

  /// Read the unit's row.
  ///
  /// # Errors
  /// `NotFound` when nothing is stored, `Expired` when the row is past
  /// its deadline (it stays stored until `clean`), `Storage` on faults.
  async fn read(&self, unit: Unit) -> Result<StoredReport, ServiceError>;

  /// Delete this component's rows whose deadline has passed.
  ///
  /// Idempotent. Returns how many rows were removed.
  async fn clean(&self) -> Result<usize, ServiceError>;
}
