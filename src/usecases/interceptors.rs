//! Standard Interceptors - Correlation, Metrics, Logging, Tracing, Errors
//!
//! Every interceptor except the correlation one reads the correlation
//! ID with `RequestContext::require_correlation_id`, so running any of
//! them outside a pipeline that assigns IDs panics immediately.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::pipeline::{Interceptor, InterceptorKind, Next, Pipeline};
use crate::domain::{CorrelationId, RequestContext, ServiceError};
use crate::ports::{ErrorTracker, IdSource, RequestMetrics, Tracer};

/// Attach a correlation ID unless the context already carries one.
///
/// Idempotent: a second call on the result returns it unchanged.
pub fn assign_correlation_id(ctx: RequestContext, ids: &dyn IdSource) -> RequestContext {
  if ctx.correlation_id().is_some() {
    return ctx;
  }

  let minted = CorrelationId::parse(&ids.next_valid_id()).unwrap_or_else(|| {
    warn!("ID source returned a blank ID, using a random correlation ID");
    CorrelationId::random()
  });
  ctx.with_correlation_id(minted)
}

/// Assigns correlation IDs; outermost layer.
pub struct CorrelationIdInterceptor {
  ids: Arc<dyn IdSource>,
}

impl CorrelationIdInterceptor {
  pub fn new(ids: Arc<dyn IdSource>) -> Self {
    Self { ids }
  }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for CorrelationIdInterceptor {
  fn kind(&self) -> InterceptorKind {
    InterceptorKind::CorrelationId
  }

  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError> {
    let ctx = assign_correlation_id(ctx, self.ids.as_ref());
    next.run(ctx).await
  }
}

/// Observes request latency into the metrics sink.
pub struct MetricsInterceptor {
  metrics: Arc<dyn RequestMetrics>,
}

impl MetricsInterceptor {
  pub fn new(metrics: Arc<dyn RequestMetrics>) -> Self {
    Self { metrics }
  }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for MetricsInterceptor {
  fn kind(&self) -> InterceptorKind {
    InterceptorKind::Metrics
  }

  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError> {
    let correlation_id = ctx.require_correlation_id().clone();
    let operation = ctx.operation().to_owned();

    let started = Instant::now();
    let result = next.run(ctx).await;
    self
      .metrics
      .observe_request(&operation, correlation_id.as_str(), started.elapsed());

    result
  }
}

/// Emits one structured log event per operation.
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for LoggingInterceptor {
  fn kind(&self) -> InterceptorKind {
    InterceptorKind::Logging
  }

  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError> {
    let correlation_id = ctx.require_correlation_id().clone();
    let operation = ctx.operation().to_owned();

    let started = Instant::now();
    let result = next.run(ctx).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match &result {
      Ok(_) => info!(
        operation = %operation,
        correlation_id = %correlation_id,
        elapsed_ms,
        "Operation completed"
      ),
      Err(e) => warn!(
        operation = %operation,
        correlation_id = %correlation_id,
        elapsed_ms,
        error = %e,
        "Operation failed"
      ),
    }

    result
  }
}

/// Opens a child span when the context carries a parent span.
///
/// Without a parent the call passes through untraced; no root span is
/// started here.
pub struct TracingInterceptor {
  tracer: Arc<dyn Tracer>,
}

impl TracingInterceptor {
  pub fn new(tracer: Arc<dyn Tracer>) -> Self {
    Self { tracer }
  }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for TracingInterceptor {
  fn kind(&self) -> InterceptorKind {
    InterceptorKind::Tracing
  }

  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError> {
    let correlation_id = ctx.require_correlation_id().clone();
    let Some(parent) = ctx.span().cloned() else {
      return next.run(ctx).await;
    };

    let span = self.tracer.start_span(ctx.operation(), Some(&parent));
    span.set_tag("correlation_id", correlation_id.as_str());
    span.set_tag("operation", ctx.operation());

    let ctx = ctx.with_span(span.context().clone());
    let result = next.run(ctx).await;

    if let Err(e) = &result {
      span.set_tag("error", &e.to_string());
    }
    span.finish();

    result
  }
}

/// Forwards operation errors to the error tracker; innermost layer.
pub struct ErrorTrackingInterceptor {
  tracker: Arc<dyn ErrorTracker>,
}

impl ErrorTrackingInterceptor {
  pub fn new(tracker: Arc<dyn ErrorTracker>) -> Self {
    Self { tracker }
  }
}

#[async_trait]
impl<T: Send + 'static> Interceptor<T> for ErrorTrackingInterceptor {
  fn kind(&self) -> InterceptorKind {
    InterceptorKind::ErrorTracking
  }

  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError> {
    let correlation_id = ctx.require_correlation_id().clone();
    let result = next.run(ctx).await;

    if let Err(error) = &result {
      let tags = BTreeMap::from([("correlation_id".to_string(), correlation_id.to_string())]);
      let event_id = self.tracker.capture_error(error, &tags);
      debug!(event_id = %event_id, correlation_id = %correlation_id, "Error forwarded to tracker");
    }

    result
  }
}

/// Collaborators needed to build the standard pipeline.
#[derive(Clone)]
pub struct Instrumentation {
  pub ids: Arc<dyn IdSource>,
  pub metrics: Arc<dyn RequestMetrics>,
  pub tracer: Arc<dyn Tracer>,
  pub errors: Arc<dyn ErrorTracker>,
}

impl Instrumentation {
  /// The standard five-layer pipeline for operations returning `T`.
  pub fn pipeline<T: Send + 'static>(&self) -> Pipeline<T> {
    Pipeline::<T>::builder()
      .with(Arc::new(CorrelationIdInterceptor::new(Arc::clone(&self.ids))))
      .with(Arc::new(MetricsInterceptor::new(Arc::clone(&self.metrics))))
      .with(Arc::new(LoggingInterceptor))
      .with(Arc::new(TracingInterceptor::new(Arc::clone(&self.tracer))))
      .with(Arc::new(ErrorTrackingInterceptor::new(Arc::clone(&self.errors))))
      .build()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::usecases::pipeline::Operation;

  struct CountingIds(AtomicUsize);

  impl IdSource for CountingIds {
    fn next_id(&self) -> anyhow::Result<String> {
      Ok(self.next_valid_id())
    }

    fn next_valid_id(&self) -> String {
      format!("cid-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
  }

  /// Echoes the correlation ID each layer saw.
  struct Echo;

  #[async_trait]
  impl Operation for Echo {
    type Output = String;

    fn name(&self) -> &str {
      "echo"
    }

    async fn call(&self, ctx: RequestContext) -> Result<String, ServiceError> {
      Ok(ctx.require_correlation_id().to_string())
    }
  }

  #[test]
  fn test_assignment_is_idempotent() {
    let ids = CountingIds(AtomicUsize::new(0));

    let once = assign_correlation_id(RequestContext::new("op"), &ids);
    let twice = assign_correlation_id(once.clone(), &ids);

    assert_eq!(once.correlation_id(), twice.correlation_id());
    assert_eq!(once.require_correlation_id().as_str(), "cid-0");
    assert_eq!(ids.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_inbound_id_is_kept() {
    let ids = CountingIds(AtomicUsize::new(0));
    let inbound = RequestContext::new("op").with_correlation_id(CorrelationId::parse("abc").unwrap());

    let ctx = assign_correlation_id(inbound, &ids);
    assert_eq!(ctx.require_correlation_id().as_str(), "abc");
    assert_eq!(ids.0.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_correlation_interceptor_mints_for_operation() {
    let ids: Arc<dyn IdSource> = Arc::new(CountingIds(AtomicUsize::new(7)));
    let pipeline = Pipeline::<String>::builder()
      .with(Arc::new(CorrelationIdInterceptor::new(ids)))
      .with(Arc::new(LoggingInterceptor))
      .build();

    let seen = pipeline.execute(&Echo, RequestContext::new("echo")).await.unwrap();
    assert_eq!(seen, "cid-7");
  }

  #[tokio::test]
  #[should_panic(expected = "without a correlation ID")]
  async fn test_logging_without_correlation_fails_loudly() {
    let pipeline = Pipeline::<String>::builder()
      .with(Arc::new(LoggingInterceptor))
      .build();

    let _ = pipeline.execute(&Echo, RequestContext::new("echo")).await;
  }

  struct Recorder(Mutex<Vec<(String, String)>>);

  impl RequestMetrics for Recorder {
    fn observe_request(&self, operation: &str, correlation_id: &str, _elapsed: std::time::Duration) {
      self
        .0
        .lock()
        .unwrap()
        .push((operation.to_string(), correlation_id.to_string()));
    }
  }

  #[tokio::test]
  async fn test_metrics_observed_once_with_labels() {
    let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
    let ids: Arc<dyn IdSource> = Arc::new(CountingIds(AtomicUsize::new(0)));
    let pipeline = Pipeline::<String>::builder()
      .with(Arc::new(CorrelationIdInterceptor::new(ids)))
      .with(Arc::new(MetricsInterceptor::new(Arc::clone(&recorder) as Arc<dyn RequestMetrics>)))
      .build();

    pipeline.execute(&Echo, RequestContext::new("x")).await.unwrap();

    assert_eq!(
      *recorder.0.lock().unwrap(),
      vec![("echo".to_string(), "cid-0".to_string())]
    );
  }
}
