//! Telemetry Adapters - Tracer, Error Tracker and ID Source
//!
//! Log-backed implementations of the observability ports plus the
//! UUID `IdSource`. Each writes through `tracing`, so the JSON
//! subscriber configured in `main` is the single output path.

pub mod log_error_tracker;
pub mod log_tracer;
pub mod uuid_ids;

pub use log_error_tracker::LogErrorTracker;
pub use log_tracer::{LogSpan, LogTracer};
pub use uuid_ids::UuidIdSource;
