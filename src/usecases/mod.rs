//! Use Cases Layer - Application Logic
//!
//! Orchestrates domain types with port interfaces. Each use case is a
//! self-contained piece of the service's behavior.
//!
//! Use cases:
//! - `pipeline` / `interceptors`: Middleware around every operation
//! - `HealthAggregator`: Probe fan-out, rollup and cached reads
//! - `Scheduler`: Periodic probing and report sweeps
//! - `id_issuer`: The ID endpoints as operations

pub mod health_aggregator;
pub mod id_issuer;
pub mod interceptors;
pub mod pipeline;
pub mod scheduler;

pub use health_aggregator::{AllHealthChecks, HealthAggregator, ProbeObserver, UnitHealthChecks};
pub use id_issuer::{NextIdOperation, NextValidIdOperation};
pub use interceptors::{Instrumentation, assign_correlation_id};
pub use pipeline::{Interceptor, InterceptorKind, Next, Operation, Pipeline, compose};
pub use scheduler::Scheduler;
