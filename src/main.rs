//! Flaki Service - Entry Point
//!
//! Initializes configuration, logging, the health report store, the
//! backend probes and the public endpoints. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create the shutdown broadcast channel
//! 4. Open the health report table (atomic JSON file)
//! 5. Build the instrumentation collaborators (IDs, metrics, tracer, error tracker)
//! 6. Build one probe per unit and the health aggregator
//! 7. Spawn the probe and cleanup schedules
//! 8. Spawn the Prometheus metrics server
//! 9. Spawn the public HTTP server
//! 10. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use flaki_service::adapters::http::{AppState, HttpServer};
use flaki_service::adapters::metrics::MetricsRegistry;
use flaki_service::adapters::persistence::FileReportStore;
use flaki_service::adapters::probes::{
    CacheServerProbe, ErrorTrackerProbe, MetricsStoreProbe, TracingCollectorProbe,
};
use flaki_service::adapters::telemetry::{LogErrorTracker, LogTracer, UuidIdSource};
use flaki_service::config::{self, AppConfig};
use flaki_service::domain::Unit;
use flaki_service::ports::{BackendProbe, IdSource, ReportStore, SystemClock};
use flaki_service::usecases::{HealthAggregator, Instrumentation, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config_path = std::env::var("FLAKI_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        component_id = %config.service.component_id,
        version = env!("CARGO_PKG_VERSION"),
        "Starting Flaki service"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Open the health report table ─────────────────────
    let store: Arc<dyn ReportStore> = Arc::new(
        FileReportStore::open(
            &config.persistence.data_dir,
            &config.service.name,
            &config.service.component_id,
            Arc::new(SystemClock),
        )
        .await
        .context("Failed to open health report store")?,
    );

    // ── 5. Instrumentation collaborators ────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let ids: Arc<dyn IdSource> = Arc::new(UuidIdSource::new());
    let instrumentation = Instrumentation {
        ids: Arc::clone(&ids),
        metrics: Arc::clone(&metrics) as _,
        tracer: Arc::new(LogTracer::new()),
        errors: Arc::new(LogErrorTracker::new()),
    };

    // ── 6. Probes + health aggregator ───────────────────────
    let aggregator = Arc::new(
        build_probes(&config)?
            .into_iter()
            .fold(
                HealthAggregator::new(Arc::clone(&store)),
                |aggregator, probe| {
                    let validity = config.health.unit(probe.unit()).validity();
                    aggregator.with_probe(probe, validity)
                },
            )
            .with_observer(Arc::clone(&metrics) as _),
    );

    // ── 7. Probe and cleanup schedules ──────────────────────
    let scheduler = Unit::ALL.into_iter().fold(
        Scheduler::new(
            Arc::clone(&aggregator),
            Arc::clone(&store),
            Arc::clone(&ids),
            config.health.cleanup_interval(),
        ),
        |scheduler, unit| scheduler.with_probe_interval(unit, config.health.unit(unit).interval()),
    );
    let job_handles = scheduler.spawn(&shutdown_tx);

    // ── 8. Prometheus metrics server ────────────────────────
    let metrics_handle = if config.metrics.enabled {
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind_address = config.metrics.bind_address.clone();
        let registry = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = registry.serve(bind_address, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 9. Public HTTP server ───────────────────────────────
    let state = Arc::new(AppState::new(Arc::clone(&aggregator), &instrumentation));
    let http_shutdown = shutdown_tx.subscribe();
    let http_server = HttpServer::new(state, config.http.bind_address.clone());
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!(error = %e, "HTTP server failed");
        }
    });

    info!("All tasks spawned, service is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());

    // 2. Drain in-flight HTTP requests (up to 10s)
    let _ = tokio::time::timeout(Duration::from_secs(10), http_handle).await;

    // 3. Stop schedules; an in-flight probe is abandoned
    for handle in job_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // 4. Stop metrics server
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// One probe per unit; disabled units get a probe that reports
/// Deactivated.
fn build_probes(config: &AppConfig) -> Result<Vec<Arc<dyn BackendProbe>>> {
    let health = &config.health;
    let timeout = health.probe_timeout();

    let metrics_probe = MetricsStoreProbe::new(&health.metrics, timeout)
        .context("Failed to build metrics store probe")?;
    let error_tracker_probe = ErrorTrackerProbe::new(&health.errortracker, timeout)
        .context("Failed to build error tracker probe")?;

    let probes: Vec<Arc<dyn BackendProbe>> = vec![
        Arc::new(metrics_probe) as Arc<dyn BackendProbe>,
        Arc::new(TracingCollectorProbe::new(&health.tracing)),
        Arc::new(CacheServerProbe::new(&health.cache, timeout)),
        Arc::new(error_tracker_probe),
    ];
    Ok(probes)
}
