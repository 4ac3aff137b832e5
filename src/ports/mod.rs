//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `IdSource`: Unique ID generation (external library)
//! - `BackendProbe`: One health check target
//! - `ReportStore`: Persistent, expiring health report cache
//! - `Tracer` / `ErrorTracker` / `RequestMetrics`: Instrumentation sinks
//! - `Clock`: Wall-clock time in UTC

pub mod clock;
pub mod id_source;
pub mod observability;
pub mod probe;
pub mod report_store;

pub use clock::{Clock, SystemClock};
pub use id_source::IdSource;
pub use observability::{ErrorTracker, RequestMetrics, Span, Tracer};
pub use probe::BackendProbe;
pub use report_store::ReportStore;
