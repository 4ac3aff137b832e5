//! Health Aggregator - Fan-out/Fan-in Over Backend Probes
//!
//! Composes the registered probes into one query surface:
//! - `exec_health_checks`: probe now and refresh the report store
//! - `read_health_checks`: serve the stored reports, never probing
//! - `health_checks`: stored reports, probing only on a cache miss
//! - `all_health_checks`: every unit rolled up to one status
//!
//! The health endpoints call these through the `Operation` wrappers at
//! the bottom of this file so they pass through the middleware pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use super::pipeline::Operation;
use crate::domain::{
  AggregateSnapshot, HealthStatus, Report, RequestContext, ServiceError, Unit, rollup,
};
use crate::ports::{BackendProbe, ReportStore};

/// Observer for fresh probe results (e.g. Prometheus counters).
pub trait ProbeObserver: Send + Sync + 'static {
  fn record_reports(&self, unit: Unit, reports: &[Report]);

  /// A probe ran but its reports could not be stored.
  fn record_store_failure(&self, unit: Unit);
}

struct RegisteredProbe {
  probe: Arc<dyn BackendProbe>,
  validity: Duration,
}

/// Aggregates probes, the report store and the rollup rule.
pub struct HealthAggregator {
  probes: BTreeMap<Unit, RegisteredProbe>,
  store: Arc<dyn ReportStore>,
  observer: Option<Arc<dyn ProbeObserver>>,
}

impl HealthAggregator {
  pub fn new(store: Arc<dyn ReportStore>) -> Self {
    Self {
      probes: BTreeMap::new(),
      store,
      observer: None,
    }
  }

  /// Register a probe; fresh results stay current for `validity`.
  #[must_use]
  pub fn with_probe(mut self, probe: Arc<dyn BackendProbe>, validity: Duration) -> Self {
    self
      .probes
      .insert(probe.unit(), RegisteredProbe { probe, validity });
    self
  }

  #[must_use]
  pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
    self.observer = Some(observer);
    self
  }

  /// Units with a registered probe, in name order.
  pub fn units(&self) -> Vec<Unit> {
    self.probes.keys().copied().collect()
  }

  fn resolve(&self, unit: &str) -> Result<Unit, ServiceError> {
    let parsed: Unit = unit.parse()?;
    if self.probes.contains_key(&parsed) {
      Ok(parsed)
    } else {
      Err(ServiceError::InvalidUnit(unit.to_string()))
    }
  }

  /// Probe `unit` now and store the result.
  ///
  /// # Errors
  /// `InvalidUnit` for unknown names, `Cancelled` when `ctx` is
  /// cancelled before the probe finishes, `Storage` when the store
  /// rejects the write.
  pub async fn exec_health_checks(
    &self,
    ctx: &RequestContext,
    unit: &str,
  ) -> Result<Vec<Report>, ServiceError> {
    let unit = self.resolve(unit)?;
    self.exec_unit(ctx, unit).await
  }

  /// Probe a known unit and store the result.
  ///
  /// # Errors
  /// See [`Self::exec_health_checks`].
  #[instrument(skip_all, fields(unit = %unit))]
  pub async fn exec_unit(
    &self,
    ctx: &RequestContext,
    unit: Unit,
  ) -> Result<Vec<Report>, ServiceError> {
    let registered = self
      .probes
      .get(&unit)
      .ok_or_else(|| ServiceError::InvalidUnit(unit.to_string()))?;

    let reports = tokio::select! {
      biased;
      () = ctx.cancelled() => return Err(ServiceError::Cancelled),
      reports = registered.probe.health_checks(ctx) => reports,
    };

    // A probe that noticed cancellation itself still must not be stored.
    if ctx.is_cancelled() {
      return Err(ServiceError::Cancelled);
    }

    if let Some(observer) = &self.observer {
      observer.record_reports(unit, &reports);
    }

    if let Err(e) = self.store.update(unit, &reports, registered.validity).await {
      if let Some(observer) = &self.observer {
        observer.record_store_failure(unit);
      }
      return Err(e);
    }

    debug!(reports = reports.len(), status = %rollup(&reports), "Health checks executed");
    Ok(reports)
  }

  /// Serve the stored reports for `unit` without probing.
  ///
  /// # Errors
  /// `InvalidUnit`, or the store's `NotFound` / `Expired` / `Storage`.
  pub async fn read_health_checks(
    &self,
    _ctx: &RequestContext,
    unit: &str,
  ) -> Result<Vec<Report>, ServiceError> {
    let unit = self.resolve(unit)?;
    Ok(self.store.read(unit).await?.reports)
  }

  /// Stored reports, probing afresh when nothing current is stored.
  ///
  /// # Errors
  /// `InvalidUnit`, `Cancelled` or `Storage`; cache misses are handled.
  pub async fn health_checks(
    &self,
    ctx: &RequestContext,
    unit: &str,
  ) -> Result<Vec<Report>, ServiceError> {
    let unit = self.resolve(unit)?;
    self.cached_or_exec(ctx, unit).await
  }

  async fn cached_or_exec(
    &self,
    ctx: &RequestContext,
    unit: Unit,
  ) -> Result<Vec<Report>, ServiceError> {
    match self.store.read(unit).await {
      Ok(stored) => Ok(stored.reports),
      Err(e) if e.is_cache_miss() => {
        debug!(unit = %unit, reason = %e, "Cache miss, probing");
        self.exec_unit(ctx, unit).await
      }
      Err(e) => Err(e),
    }
  }

  /// Roll every registered unit up to a single status string.
  ///
  /// Units are looked up concurrently. A unit whose lookup fails is
  /// reported as `KO`.
  pub async fn all_health_checks(&self, ctx: &RequestContext) -> AggregateSnapshot {
    let lookups = self.probes.keys().map(|unit| async move {
      let status = match self.cached_or_exec(ctx, *unit).await {
        Ok(reports) => rollup(&reports),
        Err(e) => {
          warn!(unit = %unit, error = %e, "Health lookup failed");
          HealthStatus::Ko
        }
      };
      (unit.to_string(), status.to_string())
    });

    join_all(lookups).await.into_iter().collect()
  }
}

/// `GET /health` as an operation.
pub struct AllHealthChecks {
  aggregator: Arc<HealthAggregator>,
}

impl AllHealthChecks {
  pub fn new(aggregator: Arc<HealthAggregator>) -> Self {
    Self { aggregator }
  }
}

#[async_trait]
impl Operation for AllHealthChecks {
  type Output = AggregateSnapshot;

  fn name(&self) -> &str {
    "all_health_checks"
  }

  async fn call(&self, ctx: RequestContext) -> Result<AggregateSnapshot, ServiceError> {
    Ok(self.aggregator.all_health_checks(&ctx).await)
  }
}

/// `GET /health/{unit}` as an operation.
pub struct UnitHealthChecks {
  aggregator: Arc<HealthAggregator>,
  unit: String,
  force_probe: bool,
}

impl UnitHealthChecks {
  /// With `force_probe` the unit is always probed afresh.
  pub fn new(aggregator: Arc<HealthAggregator>, unit: impl Into<String>, force_probe: bool) -> Self {
    Self {
      aggregator,
      unit: unit.into(),
      force_probe,
    }
  }
}

#[async_trait]
impl Operation for UnitHealthChecks {
  type Output = Vec<Report>;

  fn name(&self) -> &str {
    if self.force_probe {
      "exec_health_checks"
    } else {
      "health_checks"
    }
  }

  async fn call(&self, ctx: RequestContext) -> Result<Vec<Report>, ServiceError> {
    if self.force_probe {
      self.aggregator.exec_health_checks(&ctx, &self.unit).await
    } else {
      self.aggregator.health_checks(&ctx, &self.unit).await
    }
  }
}
