//! Middleware Pipeline - Ordered Interceptors Around Operations
//!
//! An `Operation` is a named, context-carrying unit of request work.
//! A `Pipeline` is an ordered list of `Interceptor` objects; each one
//! receives the context plus a `Next` handle that runs the rest of the
//! chain and finally the operation itself.
//!
//! System-wide order, outermost first:
//!
//! ```text
//! correlation ID → metrics → logging → tracing → error tracking → operation
//! ```
//!
//! The correlation interceptor is outermost so every other layer can
//! read the ID; error tracking is innermost so it sees the operation's
//! own error. `PipelineBuilder` enforces the order whatever order the
//! interceptors are supplied in.
//!
//! Panics raised by an operation unwind through every layer untouched:
//! nothing in the chain catches them or turns errors into panics.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{RequestContext, ServiceError};

/// A request-handling operation.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
  /// Successful result type.
  type Output: Send + 'static;

  /// Name used in logs, metrics and span names.
  fn name(&self) -> &str;

  /// Run the operation.
  async fn call(&self, ctx: RequestContext) -> Result<Self::Output, ServiceError>;
}

/// Position of an interceptor in the fixed pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InterceptorKind {
  CorrelationId,
  Metrics,
  Logging,
  Tracing,
  ErrorTracking,
}

/// A cross-cutting behavior wrapped around an operation.
#[async_trait]
pub trait Interceptor<T: Send + 'static>: Send + Sync + 'static {
  /// Where this interceptor sits in the pipeline.
  fn kind(&self) -> InterceptorKind;

  /// Run around the remainder of the chain.
  ///
  /// Implementations must call `next.run` exactly once and return its
  /// result unchanged.
  async fn intercept(&self, ctx: RequestContext, next: Next<'_, T>) -> Result<T, ServiceError>;
}

/// The remainder of a pipeline, ending at the operation.
pub struct Next<'a, T: Send + 'static> {
  chain: &'a [Arc<dyn Interceptor<T>>],
  operation: &'a dyn Operation<Output = T>,
}

impl<T: Send + 'static> Next<'_, T> {
  /// Run the next interceptor, or the operation when none remain.
  pub async fn run(self, ctx: RequestContext) -> Result<T, ServiceError> {
    match self.chain.split_first() {
      Some((head, rest)) => {
        head
          .intercept(
            ctx,
            Next {
              chain: rest,
              operation: self.operation,
            },
          )
          .await
      }
      None => self.operation.call(ctx).await,
    }
  }
}

/// An ordered set of interceptors.
pub struct Pipeline<T: Send + 'static> {
  interceptors: Vec<Arc<dyn Interceptor<T>>>,
}

impl<T: Send + 'static> Clone for Pipeline<T> {
  fn clone(&self) -> Self {
    Self {
      interceptors: self.interceptors.clone(),
    }
  }
}

impl<T: Send + 'static> Pipeline<T> {
  pub fn builder() -> PipelineBuilder<T> {
    PipelineBuilder::default()
  }

  /// Interceptor kinds, outermost first.
  pub fn kinds(&self) -> Vec<InterceptorKind> {
    self.interceptors.iter().map(|i| i.kind()).collect()
  }

  /// Run `operation` inside the pipeline.
  ///
  /// # Errors
  /// Returns whatever error the operation returned.
  pub async fn execute(
    &self,
    operation: &dyn Operation<Output = T>,
    ctx: RequestContext,
  ) -> Result<T, ServiceError> {
    let ctx = ctx.with_operation(operation.name().to_owned());
    Next {
      chain: &self.interceptors,
      operation,
    }
    .run(ctx)
    .await
  }
}

/// Collects interceptors and orders them by kind.
///
/// Adding a second interceptor of the same kind replaces the first.
pub struct PipelineBuilder<T: Send + 'static> {
  slots: BTreeMap<InterceptorKind, Arc<dyn Interceptor<T>>>,
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
  fn default() -> Self {
    Self {
      slots: BTreeMap::new(),
    }
  }
}

impl<T: Send + 'static> PipelineBuilder<T> {
  #[must_use]
  pub fn with(mut self, interceptor: Arc<dyn Interceptor<T>>) -> Self {
    self.slots.insert(interceptor.kind(), interceptor);
    self
  }

  pub fn build(self) -> Pipeline<T> {
    Pipeline {
      interceptors: self.slots.into_values().collect(),
    }
  }
}

/// An operation wrapped in a pipeline; itself an `Operation`.
pub struct Instrumented<O: Operation> {
  operation: O,
  pipeline: Pipeline<O::Output>,
}

/// Wrap `operation` with `pipeline`.
pub fn compose<O: Operation>(operation: O, pipeline: Pipeline<O::Output>) -> Instrumented<O> {
  Instrumented {
    operation,
    pipeline,
  }
}

#[async_trait]
impl<O: Operation> Operation for Instrumented<O> {
  type Output = O::Output;

  fn name(&self) -> &str {
    self.operation.name()
  }

  async fn call(&self, ctx: RequestContext) -> Result<Self::Output, ServiceError> {
    self.pipeline.execute(&self.operation, ctx).await
  }
}
