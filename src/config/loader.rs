//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::Unit;

/// Longest accepted validity window (ten years).
pub const MAX_VALIDITY_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    component = %config.service.name,
    component_id = %config.service.component_id,
    enabled_units = Unit::ALL
      .iter()
      .filter(|u| config.health.unit(**u).enabled)
      .count(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Returns error on TOML syntax problems or validation failures.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty service identity
/// - Positive cleanup interval and probe timeout
/// - A target for every enabled probe
/// - Validity windows longer than probe intervals and at most
///   `MAX_VALIDITY_SECONDS`
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "service.name must not be empty"
  );
  anyhow::ensure!(
    !config.service.component_id.is_empty(),
    "service.component_id must not be empty"
  );

  anyhow::ensure!(
    config.health.cleanup_interval_seconds > 0,
    "health.cleanup_interval_seconds must be positive"
  );
  anyhow::ensure!(
    config.health.probe_timeout_seconds > 0,
    "health.probe_timeout_seconds must be positive"
  );

  for unit in Unit::ALL {
    let probe = config.health.unit(unit);

    anyhow::ensure!(
      probe.interval_seconds > 0,
      "health.{unit}.interval_seconds must be positive"
    );
    anyhow::ensure!(
      probe.validity_seconds > probe.interval_seconds,
      "health.{unit}.validity_seconds ({}) must exceed interval_seconds ({})",
      probe.validity_seconds,
      probe.interval_seconds
    );
    anyhow::ensure!(
      probe.validity_seconds <= MAX_VALIDITY_SECONDS,
      "health.{unit}.validity_seconds ({}) must not exceed {MAX_VALIDITY_SECONDS}",
      probe.validity_seconds
    );

    if probe.enabled {
      anyhow::ensure!(
        !probe.target.trim().is_empty(),
        "health.{unit} is enabled but has no target"
      );
    }
  }

  Ok(())
}
