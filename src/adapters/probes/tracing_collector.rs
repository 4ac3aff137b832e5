//! Tracing Collector Probe
//!
//! The collector exposes no health endpoint this service can use yet,
//! so an enabled probe reports KO with an explanation instead of
//! pretending the collector is healthy.

use async_trait::async_trait;

use super::PING_CHECK;
use crate::config::ProbeConfig;
use crate::domain::{ProbeDuration, Report, RequestContext, Unit};
use crate::ports::BackendProbe;

const NOT_IMPLEMENTED: &str = "tracing collector health check is not implemented";

/// Placeholder probe for the tracing collector.
pub struct TracingCollectorProbe {
  enabled: bool,
}

impl TracingCollectorProbe {
  pub const fn new(config: &ProbeConfig) -> Self {
    Self {
      enabled: config.enabled,
    }
  }
}

#[async_trait]
impl BackendProbe for TracingCollectorProbe {
  fn unit(&self) -> Unit {
    Unit::Tracing
  }

  async fn health_checks(&self, _ctx: &RequestContext) -> Vec<Report> {
    if !self.enabled {
      return vec![Report::deactivated(PING_CHECK)];
    }
    vec![Report::ko(PING_CHECK, ProbeDuration::NotApplicable, NOT_IMPLEMENTED)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::HealthStatus;

  #[tokio::test]
  async fn test_enabled_stub_reports_ko() {
    let probe = TracingCollectorProbe::new(&ProbeConfig {
      enabled: true,
      target: "collector:6831".into(),
      ..ProbeConfig::default()
    });

    let reports = probe.health_checks(&RequestContext::new("t")).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, HealthStatus::Ko);
    assert_eq!(reports[0].duration, ProbeDuration::NotApplicable);
    assert_eq!(reports[0].error.as_deref(), Some(NOT_IMPLEMENTED));
  }

  #[tokio::test]
  async fn test_disabled_stub_is_deactivated() {
    let probe = TracingCollectorProbe::new(&ProbeConfig::default());
    let reports = probe.health_checks(&RequestContext::new("t")).await;
    assert_eq!(reports[0].status, HealthStatus::Deactivated);
  }
}
