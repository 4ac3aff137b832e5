//! Service error taxonomy.
//!
//! Probe failures are not errors: they travel as KO reports. Everything
//! here is returned to a caller or logged by the scheduler.

use chrono::{DateTime, Utc};

/// Boxed source error for storage faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Nothing stored for the unit yet.
    #[error("no health report stored for unit '{unit}'")]
    NotFound { unit: String },

    /// A row exists but its validity window has passed.
    #[error("health report for unit '{unit}' expired at {valid_until}")]
    Expired {
        unit: String,
        valid_until: DateTime<Utc>,
    },

    #[error("unknown health unit '{0}'")]
    InvalidUnit(String),

    /// The persistence layer failed.
    #[error("storage failure for {component}/{unit}: {source}")]
    Storage {
        component: String,
        unit: String,
        #[source]
        source: BoxError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("id generation failed: {0}")]
    IdGeneration(String),
}

impl ServiceError {
    /// Wrap a persistence fault with its component and unit.
    pub fn storage(
        component: impl Into<String>,
        unit: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Storage {
            component: component.into(),
            unit: unit.into(),
            source: source.into(),
        }
    }

    /// True for the recoverable cache-miss class (`NotFound`, `Expired`).
    ///
    /// Callers handle these by probing afresh.
    pub const fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Expired { .. })
    }

    /// True for errors caused by the caller's input.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUnit(_))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_classes() {
        let miss = ServiceError::NotFound {
            unit: "cache".into(),
        };
        assert!(miss.is_cache_miss());
        assert!(!miss.is_client_error());

        let invalid = ServiceError::InvalidUnit("bogus".into());
        assert!(invalid.is_client_error());
        assert!(!invalid.is_cache_miss());
        assert_eq!(invalid.to_string(), "unknown health unit 'bogus'");
    }

    #[test]
    fn test_storage_error_keeps_source() {
        let err = ServiceError::storage(
            "flaki",
            "metrics",
            anyhow::anyhow!("disk full"),
        );
        assert_eq!(
            err.to_string(),
            "storage failure for flaki/metrics: disk full"
        );
        assert!(err.source().is_some());
    }
}
