//! Error Tracker Probe - Sentry-style `/_health` Endpoint
//!
//! The configured target is the tracker DSN
//! (`scheme://key@host[:port]/project`). The health endpoint is
//! derived from it as `scheme://host[:port]/_health` and must answer
//! `200` with the body `ok`.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::instrument;

use super::{PING_CHECK, timed_check};
use crate::config::ProbeConfig;
use crate::domain::{Report, RequestContext, Unit};
use crate::ports::BackendProbe;

/// Probe for the error tracking service.
pub struct ErrorTrackerProbe {
  http: Client,
  health_url: Option<Url>,
  timeout: Duration,
}

impl ErrorTrackerProbe {
  /// # Errors
  /// Fails when the probe is enabled and the DSN cannot be parsed.
  pub fn new(config: &ProbeConfig, timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .context("Failed to build HTTP client")?;

    let health_url = if config.enabled {
      Some(health_url_from_dsn(&config.target)?)
    } else {
      None
    };

    Ok(Self {
      http,
      health_url,
      timeout,
    })
  }

  async fn ping(&self, url: &Url) -> Result<()> {
    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    ensure!(status == StatusCode::OK, "GET {url} returned {status}");

    let body = response
      .text()
      .await
      .with_context(|| format!("Failed to read body of GET {url}"))?;
    ensure!(body.trim() == "ok", "GET {url} answered {body:?}, expected \"ok\"");
    Ok(())
  }
}

/// `scheme://key@host[:port]/project` → `scheme://host[:port]/_health`
pub fn health_url_from_dsn(dsn: &str) -> Result<Url> {
  let parsed = Url::parse(dsn).with_context(|| format!("Invalid error tracker DSN '{dsn}'"))?;
  let host = parsed
    .host_str()
    .ok_or_else(|| anyhow!("Error tracker DSN '{dsn}' has no host"))?;

  let base = match parsed.port() {
    Some(port) => format!("{}://{host}:{port}/_health", parsed.scheme()),
    None => format!("{}://{host}/_health", parsed.scheme()),
  };
  Url::parse(&base).with_context(|| format!("Invalid health URL derived from '{dsn}'"))
}

#[async_trait]
impl BackendProbe for ErrorTrackerProbe {
  fn unit(&self) -> Unit {
    Unit::ErrorTracker
  }

  #[instrument(skip_all, fields(unit = "errortracker"))]
  async fn health_checks(&self, ctx: &RequestContext) -> Vec<Report> {
    let Some(url) = &self.health_url else {
      return vec![Report::deactivated(PING_CHECK)];
    };

    vec![timed_check(PING_CHECK, self.timeout, ctx, self.ping(url)).await]
  }
}
