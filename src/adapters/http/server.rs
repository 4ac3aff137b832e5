//! HTTP Front Door - Health and ID Endpoints
//!
//! Serves the public routes via axum 0.7:
//! - `GET /health`              → `{"<unit>": "<status>", ...}`
//! - `GET /health/:unit`        → JSON array of reports
//!   (`?nocache=true` probes afresh instead of reading the cache)
//! - `GET /nextid`, `/nextvalidid` → plain-text ID
//!
//! Each handler builds the request context from the inbound headers,
//! assigns the correlation ID up front so it can be echoed in the
//! `X-Correlation-ID` response header, then runs its operation
//! through the middleware pipeline.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::domain::context::{CORRELATION_ID_HEADER, TRACEPARENT_HEADER};
use crate::domain::{
    AggregateSnapshot, CorrelationId, Report, RequestContext, ServiceError, SpanContext,
};
use crate::ports::IdSource;
use crate::usecases::{
    AllHealthChecks, HealthAggregator, Instrumentation, NextIdOperation, NextValidIdOperation,
    Operation, Pipeline, UnitHealthChecks, assign_correlation_id,
};

/// Body of every 5xx answer; internals stay in the logs.
pub const INTERNAL_ERROR_BODY: &str = "internal server error";

/// Shared state of the HTTP handlers.
pub struct AppState {
    aggregator: Arc<HealthAggregator>,
    ids: Arc<dyn IdSource>,
    snapshots: Pipeline<AggregateSnapshot>,
    reports: Pipeline<Vec<Report>>,
    issued_ids: Pipeline<String>,
}

impl AppState {
    pub fn new(aggregator: Arc<HealthAggregator>, instrumentation: &Instrumentation) -> Self {
        Self {
            aggregator,
            ids: Arc::clone(&instrumentation.ids),
            snapshots: instrumentation.pipeline(),
            reports: instrumentation.pipeline(),
            issued_ids: instrumentation.pipeline(),
        }
    }

    /// Context for one inbound request, correlation ID already set.
    fn request_context(&self, operation: &str, headers: &HeaderMap) -> RequestContext {
        let mut ctx = RequestContext::new(operation);

        if let Some(id) = header_str(headers, CORRELATION_ID_HEADER).and_then(CorrelationId::parse)
        {
            ctx = ctx.with_correlation_id(id);
        }
        if let Some(parent) =
            header_str(headers, TRACEPARENT_HEADER).and_then(SpanContext::from_traceparent)
        {
            ctx = ctx.with_span(parent);
        }

        assign_correlation_id(ctx, self.ids.as_ref())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[derive(Debug, Default, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    nocache: bool,
}

/// Build the public router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(all_health))
        .route("/health/:unit", get(unit_health))
        .route("/nextid", get(next_id))
        .route("/nextvalidid", get(next_valid_id))
        .with_state(state)
}

async fn all_health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let op = AllHealthChecks::new(Arc::clone(&state.aggregator));
    let ctx = state.request_context(op.name(), &headers);

    let result = state.snapshots.execute(&op, ctx.clone()).await;
    respond(&ctx, result.map(|snapshot| Json(snapshot).into_response()))
}

async fn unit_health(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<String>,
    Query(query): Query<HealthQuery>,
    headers: HeaderMap,
) -> Response {
    let op = UnitHealthChecks::new(Arc::clone(&state.aggregator), unit, query.nocache);
    let ctx = state.request_context(op.name(), &headers);

    let result = state.reports.execute(&op, ctx.clone()).await;
    respond(&ctx, result.map(|reports| Json(reports).into_response()))
}

async fn next_id(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let op = NextIdOperation::new(Arc::clone(&state.ids));
    let ctx = state.request_context(op.name(), &headers);

    let result = state.issued_ids.execute(&op, ctx.clone()).await;
    respond(&ctx, result.map(IntoResponse::into_response))
}

async fn next_valid_id(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let op = NextValidIdOperation::new(Arc::clone(&state.ids));
    let ctx = state.request_context(op.name(), &headers);

    let result = state.issued_ids.execute(&op, ctx.clone()).await;
    respond(&ctx, result.map(IntoResponse::into_response))
}

/// Map the outcome to a response and echo the correlation ID.
fn respond(ctx: &RequestContext, result: Result<Response, ServiceError>) -> Response {
    let mut response = match result {
        Ok(response) => response,
        Err(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response(),
    };

    if let Some(value) = ctx
        .correlation_id()
        .and_then(|id| HeaderValue::from_str(id.as_str()).ok())
    {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Axum-based public HTTP server.
pub struct HttpServer {
    state: Arc<AppState>,
    bind_address: String,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>, bind_address: impl Into<String>) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
        }
    }

    /// Serve until the shutdown broadcast fires.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "HTTP server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
