//! Metrics Store Probe - HTTP Ping Endpoint
//!
//! Checks an InfluxDB-compatible metrics store with `GET {url}/ping`.
//! Any 2xx answer counts as healthy.

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use super::{PING_CHECK, timed_check};
use crate::config::ProbeConfig;
use crate::domain::{Report, RequestContext, Unit};
use crate::ports::BackendProbe;

/// Probe for the metrics store.
pub struct MetricsStoreProbe {
  http: Client,
  ping_url: Option<String>,
  timeout: Duration,
}

impl MetricsStoreProbe {
  /// Build the probe; a disabled config yields a probe that only
  /// reports Deactivated.
  pub fn new(config: &ProbeConfig, timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build HTTP client")?;

    let ping_url = config
      .enabled
      .then(|| format!("{}/ping", config.target.trim_end_matches('/')));

    Ok(Self {
      http,
      ping_url,
      timeout,
    })
  }

  async fn ping(&self, url: &str) -> Result<()> {
    let response = self
      .http
      .get(url)
      .send()
      .await
      .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    ensure!(status.is_success(), "GET {url} returned {status}");
    Ok(())
  }
}

#[async_trait]
impl BackendProbe for MetricsStoreProbe {
  fn unit(&self) -> Unit {
    Unit::Metrics
  }

  #[instrument(skip_all, fields(unit = "metrics"))]
  async fn health_checks(&self, ctx: &RequestContext) -> Vec<Report> {
    let Some(url) = &self.ping_url else {
      return vec![Report::deactivated(PING_CHECK)];
    };

    vec![timed_check(PING_CHECK, self.timeout, ctx, self.ping(url)).await]
  }
}
