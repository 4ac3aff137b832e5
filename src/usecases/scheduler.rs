//! Health Scheduler - Periodic Probing and Report Sweeps
//!
//! Spawns one task per probed unit plus one cleanup task, each on its
//! own timer and independent of request traffic. A failed probe or a
//! failed sweep is logged and the next tick still fires; the schedule
//! itself is the retry mechanism. All tasks exit on the shutdown
//! broadcast, abandoning any in-flight probe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::health_aggregator::HealthAggregator;
use super::interceptors::assign_correlation_id;
use crate::domain::{RequestContext, Unit, rollup};
use crate::ports::{IdSource, ReportStore};

/// Drives periodic `exec` and `clean` calls.
pub struct Scheduler {
  aggregator: Arc<HealthAggregator>,
  store: Arc<dyn ReportStore>,
  ids: Arc<dyn IdSource>,
  probe_intervals: Vec<(Unit, Duration)>,
  cleanup_interval: Duration,
}

impl Scheduler {
  pub fn new(
    aggregator: Arc<HealthAggregator>,
    store: Arc<dyn ReportStore>,
    ids: Arc<dyn IdSource>,
    cleanup_interval: Duration,
  ) -> Self {
    Self {
      aggregator,
      store,
      ids,
      probe_intervals: Vec::new(),
      cleanup_interval,
    }
  }

  /// Probe `unit` every `interval`.
  #[must_use]
  pub fn with_probe_interval(mut self, unit: Unit, interval: Duration) -> Self {
    self.probe_intervals.push((unit, interval));
    self
  }

  /// Spawn all periodic jobs and return their join handles.
  #[instrument(skip_all)]
  pub fn spawn(&self, shutdown_tx: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(self.probe_intervals.len() + 1);

    for (unit, interval) in &self.probe_intervals {
      handles.push(tokio::spawn(run_probe_job(
        Arc::clone(&self.aggregator),
        Arc::clone(&self.ids),
        *unit,
        *interval,
        shutdown_tx.subscribe(),
      )));
    }

    handles.push(tokio::spawn(run_cleanup_job(
      Arc::clone(&self.store),
      self.cleanup_interval,
      shutdown_tx.subscribe(),
    )));

    info!(job_count = handles.len(), "Health jobs spawned");
    handles
  }
}

async fn run_probe_job(
  aggregator: Arc<HealthAggregator>,
  ids: Arc<dyn IdSource>,
  unit: Unit,
  interval: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) {
  let mut ticker = time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  info!(unit = %unit, interval_ms = interval.as_millis(), "Probe job started");

  loop {
    tokio::select! {
      biased;
      _ = shutdown_rx.recv() => break,
      _ = ticker.tick() => {}
    }

    let ctx = assign_correlation_id(
      RequestContext::new("scheduled_health_checks"),
      ids.as_ref(),
    );

    tokio::select! {
      biased;
      _ = shutdown_rx.recv() => break,
      outcome = aggregator.exec_unit(&ctx, unit) => match outcome {
        Ok(reports) => debug!(
          unit = %unit,
          status = %rollup(&reports),
          correlation_id = %ctx.require_correlation_id(),
          "Scheduled probe stored"
        ),
        Err(e) => warn!(
          unit = %unit,
          error = %e,
          correlation_id = %ctx.require_correlation_id(),
          "Scheduled probe failed"
        ),
      },
    }
  }

  info!(unit = %unit, "Probe job shutting down");
}

async fn run_cleanup_job(
  store: Arc<dyn ReportStore>,
  interval: Duration,
  mut shutdown_rx: broadcast::Receiver<()>,
) {
  let mut ticker = time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      biased;
      _ = shutdown_rx.recv() => break,
      _ = ticker.tick() => {}
    }

    match store.clean().await {
      Ok(0) => debug!("No expired health reports"),
      Ok(removed) => info!(removed, "Expired health reports removed"),
      Err(e) => warn!(error = %e, "Health report sweep failed"),
    }
  }

  info!("Cleanup job shutting down");
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;

  use super::*;
  use crate::domain::{Report, ServiceError, StoredReport};
  use crate::ports::BackendProbe;

  struct CountingProbe(Arc<AtomicUsize>);

  #[async_trait]
  impl BackendProbe for CountingProbe {
    fn unit(&self) -> Unit {
      Unit::Cache
    }

    async fn health_checks(&self, _ctx: &RequestContext) -> Vec<Report> {
      self.0.fetch_add(1, Ordering::SeqCst);
      vec![Report::ok("ping", Duration::from_millis(1))]
    }
  }

  /// Store whose writes and sweeps always fail.
  struct BrokenStore {
    cleans: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl ReportStore for BrokenStore {
    async fn update(&self, unit: Unit, _: &[Report], _: Duration) -> Result<(), ServiceError> {
      Err(ServiceError::storage("test", unit.as_str(), anyhow::anyhow!("read-only")))
    }

    async fn read(&self, unit: Unit) -> Result<StoredReport, ServiceError> {
      Err(ServiceError::NotFound {
        unit: unit.to_string(),
      })
    }

    async fn clean(&self) -> Result<usize, ServiceError> {
      self.cleans.fetch_add(1, Ordering::SeqCst);
      Err(ServiceError::storage("test", "*", anyhow::anyhow!("read-only")))
    }
  }

  struct SeqIds(AtomicUsize);

  impl IdSource for SeqIds {
    fn next_id(&self) -> anyhow::Result<String> {
      Ok(self.next_valid_id())
    }

    fn next_valid_id(&self) -> String {
      self.0.fetch_add(1, Ordering::SeqCst).to_string()
    }
  }

  #[tokio::test]
  async fn test_failures_do_not_stop_the_schedule() {
    let probes = Arc::new(AtomicUsize::new(0));
    let cleans = Arc::new(AtomicUsize::new(0));
    let store: Arc<dyn ReportStore> = Arc::new(BrokenStore {
      cleans: Arc::clone(&cleans),
    });

    let aggregator = Arc::new(
      HealthAggregator::new(Arc::clone(&store))
        .with_probe(Arc::new(CountingProbe(Arc::clone(&probes))), Duration::from_secs(1)),
    );
    let scheduler = Scheduler::new(
      aggregator,
      store,
      Arc::new(SeqIds(AtomicUsize::new(0))),
      Duration::from_millis(30),
    )
    .with_probe_interval(Unit::Cache, Duration::from_millis(20));

    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = scheduler.spawn(&shutdown_tx);
    assert_eq!(handles.len(), 2);

    time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(()).unwrap();
    for handle in handles {
      time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("job did not stop")
        .unwrap();
    }

    assert!(probes.load(Ordering::SeqCst) >= 3, "every tick must probe");
    assert!(cleans.load(Ordering::SeqCst) >= 2, "every tick must sweep");
  }
}
