//! Backend Probes - One `BackendProbe` per Monitored Unit
//!
//! Every probe runs its checks through [`timed_check`], which bounds
//! the check by the probe timeout, aborts it when the request context
//! is cancelled, measures it, and folds any failure into a KO report.
//! Disabled probes answer with a single Deactivated report and never
//! touch the network.

pub mod cache_server;
pub mod error_tracker;
pub mod metrics_store;
pub mod tracing_collector;

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tokio::time;
use tracing::debug;

use crate::domain::{ProbeDuration, Report, RequestContext};

pub use cache_server::CacheServerProbe;
pub use error_tracker::ErrorTrackerProbe;
pub use metrics_store::MetricsStoreProbe;
pub use tracing_collector::TracingCollectorProbe;

/// Name of the single connectivity check every probe runs.
pub const PING_CHECK: &str = "ping";

/// Run one check and turn its outcome into a report.
pub async fn timed_check<F>(
  name: &str,
  timeout: Duration,
  ctx: &RequestContext,
  check: F,
) -> Report
where
  F: Future<Output = anyhow::Result<()>> + Send,
{
  let started = Instant::now();

  let outcome = tokio::select! {
    biased;
    () = ctx.cancelled() => Err(anyhow!("check cancelled")),
    result = time::timeout(timeout, check) => match result {
      Ok(inner) => inner,
      Err(_) => Err(anyhow!("timed out after {}ms", timeout.as_millis())),
    },
  };

  let elapsed = started.elapsed();
  match outcome {
    Ok(()) => Report::ok(name, elapsed),
    Err(e) => {
      debug!(check = name, error = %e, "Check failed");
      Report::ko(name, ProbeDuration::Measured(elapsed), format!("{e:#}"))
    }
  }
}

#[cfg(test)]
mod tests {
  use tokio_util::sync::CancellationToken;

  use super::*;
  use crate::domain::HealthStatus;

  #[tokio::test]
  async fn test_success_is_timed() {
    let report = timed_check("ping", Duration::from_secs(1), &RequestContext::new("t"), async {
      time::sleep(Duration::from_millis(5)).await;
      Ok(())
    })
    .await;

    assert_eq!(report.status, HealthStatus::Ok);
    assert!(report.error.is_none());
    match report.duration {
      ProbeDuration::Measured(d) => assert!(d >= Duration::from_millis(5)),
      ProbeDuration::NotApplicable => panic!("duration must be measured"),
    }
  }

  #[tokio::test]
  async fn test_timeout_becomes_ko() {
    let report = timed_check("ping", Duration::from_millis(20), &RequestContext::new("t"), async {
      time::sleep(Duration::from_secs(5)).await;
      Ok(())
    })
    .await;

    assert_eq!(report.status, HealthStatus::Ko);
    assert_eq!(report.error.as_deref(), Some("timed out after 20ms"));
  }

  #[tokio::test]
  async fn test_cancelled_context_aborts_check() {
    let token = CancellationToken::new();
    token.cancel();
    let ctx = RequestContext::new("t").with_cancellation(token);

    let report = timed_check("ping", Duration::from_secs(5), &ctx, std::future::pending()).await;

    assert_eq!(report.status, HealthStatus::Ko);
    assert_eq!(report.error.as_deref(), Some("check cancelled"));
  }

  #[tokio::test]
  async fn test_error_chain_is_kept() {
    use anyhow::Context as _;

    let report = timed_check("ping", Duration::from_secs(1), &RequestContext::new("t"), async {
      Err::<(), _>(anyhow!("connection refused")).context("GET http://db/ping")
    })
    .await;

    assert_eq!(
      report.error.as_deref(),
      Some("GET http://db/ping: connection refused")
    );
  }
}
