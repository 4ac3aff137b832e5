//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, raw TCP, file I/O, Prometheus).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `http`: Public health and ID endpoints
//! - `metrics`: Prometheus metrics export
//! - `persistence`: Atomic JSON health report table
//! - `probes`: One health probe per monitored backend
//! - `telemetry`: Log-backed tracer, error tracker and ID source

pub mod http;
pub mod metrics;
pub mod persistence;
pub mod probes;
pub mod telemetry;
