//! Log Tracer - Spans Emitted as Structured Log Events
//!
//! A `Tracer` that keeps span identity W3C-compatible (32-hex trace
//! IDs, 16-hex span IDs) and writes each finished span as one
//! `tracing` event. Useful wherever no collector is deployed; the
//! events still carry trace and parent IDs for log-side correlation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use crate::domain::SpanContext;
use crate::ports::{Span, Tracer};

/// Tracer writing finished spans to the log.
#[derive(Debug, Default)]
pub struct LogTracer;

impl LogTracer {
    pub const fn new() -> Self {
        Self
    }
}

impl Tracer for LogTracer {
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<dyn Span> {
        let trace_id = parent.map_or_else(
            || Uuid::new_v4().simple().to_string(),
            |p| p.trace_id.clone(),
        );

        Arc::new(LogSpan {
            name: name.to_string(),
            context: SpanContext {
                trace_id,
                span_id: new_span_id(),
            },
            parent_span_id: parent.map(|p| p.span_id.clone()),
            started: Instant::now(),
            tags: Mutex::new(BTreeMap::new()),
            finished: AtomicBool::new(false),
        })
    }
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// A span owned by [`LogTracer`].
pub struct LogSpan {
    name: String,
    context: SpanContext,
    parent_span_id: Option<String>,
    started: Instant,
    tags: Mutex<BTreeMap<String, String>>,
    finished: AtomicBool,
}

impl LogSpan {
    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Span for LogSpan {
    fn context(&self) -> &SpanContext {
        &self.context
    }

    fn set_tag(&self, key: &str, value: &str) {
        self.tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        let tags = self
            .tags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        info!(
            span = %self.name,
            trace_id = %self.context.trace_id,
            span_id = %self.context.span_id,
            parent_span_id = self.parent_span_id.as_deref().unwrap_or(""),
            duration_us = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX),
            tags = ?tags,
            "Span finished"
        );
    }
}
