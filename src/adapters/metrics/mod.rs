//! Metrics and Monitoring Adapters
//!
//! Provides Prometheus metrics export on :9090 via axum 0.7. The
//! registry doubles as the pipeline's latency sink and the health
//! aggregator's probe observer.

pub mod prometheus;

pub use prometheus::MetricsRegistry;
