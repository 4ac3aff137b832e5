//! Observability Ports - Tracing and Error Tracking Collaborators
//!
//! The middleware pipeline talks to these traits only. Concrete
//! adapters live in `crate::adapters::telemetry`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ServiceError, SpanContext};

/// A started trace span.
pub trait Span: Send + Sync {
  /// Identity used as the parent of child spans.
  fn context(&self) -> &SpanContext;

  /// Attach a key/value tag.
  fn set_tag(&self, key: &str, value: &str);

  /// Close the span. Calling it more than once has no effect.
  fn finish(&self);
}

/// Distributed tracer.
pub trait Tracer: Send + Sync + 'static {
  /// Start a span, as a child of `parent` when given.
  fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<dyn Span>;
}

/// Error tracking service.
pub trait ErrorTracker: Send + Sync + 'static {
  /// Forward an error with tags. Returns the tracker's event ID.
  fn capture_error(&self, error: &ServiceError, tags: &BTreeMap<String, String>) -> String;
}

/// Sink for request latency observations.
pub trait RequestMetrics: Send + Sync + 'static {
  /// Record one completed operation.
  fn observe_request(&self, operation: &str, correlation_id: &str, elapsed: Duration);
}
