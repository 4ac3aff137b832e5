//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Everything
//! the health subsystem needs (probe targets, per-unit intervals and
//! validity windows, cleanup cadence, enabled flags) is passed in
//! explicitly at construction time - there are no global defaults.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::Unit;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Public HTTP listener.
  #[serde(default)]
  pub http: HttpConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Backend probes and their schedules.
  #[serde(default)]
  pub health: HealthConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Component name used as part of the report store key.
  pub name: String,
  /// Instance identifier, distinguishing replicas of the component.
  pub component_id: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  /// Bind address for the ID and health endpoints.
  #[serde(default = "default_http_addr")]
  pub bind_address: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      bind_address: default_http_addr(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory holding the health report table.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
    }
  }
}

/// Health subsystem configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
  /// Interval between expired-row sweeps (seconds).
  #[serde(default = "default_cleanup_interval")]
  pub cleanup_interval_seconds: u64,
  /// Upper bound on a single probe check (seconds).
  #[serde(default = "default_probe_timeout")]
  pub probe_timeout_seconds: u64,
  /// Metrics store probe (`target` = base URL).
  #[serde(default)]
  pub metrics: ProbeConfig,
  /// Tracing collector probe (`target` = collector address).
  #[serde(default)]
  pub tracing: ProbeConfig,
  /// Cache server probe (`target` = host:port).
  #[serde(default)]
  pub cache: ProbeConfig,
  /// Error tracker probe (`target` = DSN).
  #[serde(default)]
  pub errortracker: ProbeConfig,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      cleanup_interval_seconds: default_cleanup_interval(),
      probe_timeout_seconds: default_probe_timeout(),
      metrics: ProbeConfig::default(),
      tracing: ProbeConfig::default(),
      cache: ProbeConfig::default(),
      errortracker: ProbeConfig::default(),
    }
  }
}

impl HealthConfig {
  /// Probe settings for a unit.
  pub const fn unit(&self, unit: Unit) -> &ProbeConfig {
    match unit {
      Unit::Metrics => &self.metrics,
      Unit::Tracing => &self.tracing,
      Unit::Cache => &self.cache,
      Unit::ErrorTracker => &self.errortracker,
    }
  }

  pub const fn cleanup_interval(&self) -> Duration {
    Duration::from_secs(self.cleanup_interval_seconds)
  }

  pub const fn probe_timeout(&self) -> Duration {
    Duration::from_secs(self.probe_timeout_seconds)
  }
}

/// Settings for one backend probe.
///
/// A unit left out of the config file is disabled and reports
/// Deactivated.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
  /// Whether the backend integration is active.
  #[serde(default)]
  pub enabled: bool,
  /// Backend address (URL, host:port or DSN depending on the unit).
  #[serde(default)]
  pub target: String,
  /// Probe interval (seconds).
  #[serde(default = "default_probe_interval")]
  pub interval_seconds: u64,
  /// How long a probe result stays current (seconds).
  ///
  /// Must exceed the interval so one missed cycle does not expire
  /// the cached report.
  #[serde(default = "default_validity")]
  pub validity_seconds: u64,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      target: String::new(),
      interval_seconds: default_probe_interval(),
      validity_seconds: default_validity(),
    }
  }
}

impl ProbeConfig {
  pub const fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_seconds)
  }

  pub const fn validity(&self) -> Duration {
    Duration::from_secs(self.validity_seconds)
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_http_addr() -> String {
  "0.0.0.0:8888".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_cleanup_interval() -> u64 {
  3600
}

fn default_probe_timeout() -> u64 {
  5
}

fn default_probe_interval() -> u64 {
  60
}

fn default_validity() -> u64 {
  180
}
