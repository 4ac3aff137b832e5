//! Prometheus Metrics Registry - Service Observability
//!
//! Registers and exposes Prometheus metrics on the metrics bind
//! address for Grafana dashboards. Covers per-operation request
//! latency, probe outcomes per unit and report store failures.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::{HealthStatus, Report, Unit};
use crate::ports::RequestMetrics;
use crate::usecases::ProbeObserver;

/// Centralized Prometheus metrics for the service.
///
/// All metrics follow the naming convention `flaki_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Operation latency, labelled by operation and correlation ID.
    ///
    /// Every correlation ID opens a new series and series are never
    /// dropped, so memory and scrape size grow with request volume.
    /// Scrape with a short retention or relabel `correlation_id` away
    /// at the collector on busy instances.
    pub request_latency_seconds: HistogramVec,
    /// Probe reports produced, by unit and status.
    pub probe_reports: IntCounterVec,
    /// Probe runs whose reports could not be stored, by unit.
    pub store_failures: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "flaki_request_latency_seconds",
                "Operation latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "correlation_id"],
        )?;

        let probe_reports = IntCounterVec::new(
            Opts::new("flaki_probe_reports_total", "Probe reports produced"),
            &["unit", "status"],
        )?;

        let store_failures = IntCounterVec::new(
            Opts::new(
                "flaki_report_store_failures_total",
                "Probe runs whose reports could not be stored",
            ),
            &["unit"],
        )?;

        registry.register(Box::new(request_latency_seconds.clone()))?;
        registry.register(Box::new(probe_reports.clone()))?;
        registry.register(Box::new(store_failures.clone()))?;

        Ok(Self {
            registry,
            request_latency_seconds,
            probe_reports,
            store_failures,
        })
    }

    /// Number of latency samples recorded for an operation/ID pair.
    pub fn request_count(&self, operation: &str, correlation_id: &str) -> u64 {
        self.request_latency_seconds
            .with_label_values(&[operation, correlation_id])
            .get_sample_count()
    }

    /// Number of reports counted for a unit/status pair.
    pub fn report_count(&self, unit: Unit, status: HealthStatus) -> u64 {
        self.probe_reports
            .with_label_values(&[unit.as_str(), status.as_str()])
            .get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(text) => (StatusCode::OK, text),
                        Err(e) => {
                            warn!(error = %e, "Metrics rendering failed");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl RequestMetrics for MetricsRegistry {
    fn observe_request(&self, operation: &str, correlation_id: &str, elapsed: Duration) {
        self.request_latency_seconds
            .with_label_values(&[operation, correlation_id])
            .observe(elapsed.as_secs_f64());
    }
}

impl ProbeObserver for MetricsRegistry {
    fn record_reports(&self, unit: Unit, reports: &[Report]) {
        for report in reports {
            self.probe_reports
                .with_label_values(&[unit.as_str(), report.status.as_str()])
                .inc();
        }
    }

    fn record_store_failure(&self, unit: Unit) {
        self.store_failures.with_label_values(&[unit.as_str()]).inc();
    }
}
