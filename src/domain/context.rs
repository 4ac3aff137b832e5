//! Request Context - Immutable Request-scoped Values
//!
//! Carries the operation name, correlation ID, active trace span and
//! cancellation token through every interceptor and down into probes.
//! A context is never mutated in place: setting a value consumes the
//! context and returns a new one, so every layer downstream of the
//! assignment observes the same correlation ID.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// HTTP header carrying an inbound correlation ID.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// W3C trace context header carrying an inbound parent span.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Opaque token identifying one logical request across all layers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an inbound value.
    ///
    /// Returns `None` for blank input so an empty header never counts
    /// as an already-assigned ID.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// A random UUID v4 correlation ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a trace span, as propagated between processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanContext {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
}

impl SpanContext {
    /// Parse a W3C `traceparent` header (`00-<trace>-<span>-<flags>`).
    ///
    /// All-zero trace or span IDs are invalid per the W3C format and
    /// yield `None`, as does any malformed field.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if parts.next().is_some() || version != "00" {
            return None;
        }
        if !is_hex_id(trace_id, 32) || !is_hex_id(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
        })
    }

    /// Render as a sampled W3C `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_hex_id(value: &str, len: usize) -> bool {
    is_hex(value, len) && value.bytes().any(|b| b != b'0')
}

/// Request-scoped value bundle passed by parameter through every layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    operation: Arc<str>,
    correlation_id: Option<CorrelationId>,
    span: Option<SpanContext>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// A fresh context with no correlation ID and no active span.
    pub fn new(operation: impl Into<Arc<str>>) -> Self {
        Self {
            operation: operation.into(),
            correlation_id: None,
            span: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<Arc<str>>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// The correlation ID, for layers that cannot run without one.
    ///
    /// # Panics
    /// Panics when no ID has been assigned. That only happens when an
    /// interceptor is wired outside (or ahead of) the correlation
    /// interceptor, which is a pipeline construction bug.
    pub fn require_correlation_id(&self) -> &CorrelationId {
        match &self.correlation_id {
            Some(id) => id,
            None => panic!(
                "operation '{}' reached an interceptor without a correlation ID; \
                 the correlation interceptor must run first",
                self.operation
            ),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// The active trace span, if any.
    pub fn span(&self) -> Option<&SpanContext> {
        self.span.as_ref()
    }

    #[must_use]
    pub fn with_span(mut self, span: SpanContext) -> Self {
        self.span = Some(span);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }
}
