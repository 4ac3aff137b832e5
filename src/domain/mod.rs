//! Domain layer - Core types shared by every other layer.
//!
//! Holds the request context, the health data model and the error
//! taxonomy. No I/O happens here (hexagonal architecture inner ring).

pub mod context;
pub mod error;
pub mod health;

// Re-export core types for convenience
pub use context::{CorrelationId, RequestContext, SpanContext};
pub use error::ServiceError;
pub use health::{
    AggregateSnapshot, HealthStatus, ProbeDuration, Report, StoredReport, Unit, rollup,
};
