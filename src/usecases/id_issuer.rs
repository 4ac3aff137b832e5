//! ID Issuance - The Service's Own Endpoints as Operations
//!
//! Both operations delegate to the external ID generator; wrapping
//! them in the pipeline gives them correlation, metrics, logs, spans
//! and error capture like every other endpoint.

use std::sync::Arc;

use async_trait::async_trait;

use super::pipeline::Operation;
use crate::domain::{RequestContext, ServiceError};
use crate::ports::IdSource;

/// Issue the next ID, failing if the generator cannot.
pub struct NextIdOperation {
  ids: Arc<dyn IdSource>,
}

impl NextIdOperation {
  pub fn new(ids: Arc<dyn IdSource>) -> Self {
    Self { ids }
  }
}

#[async_trait]
impl Operation for NextIdOperation {
  type Output = String;

  fn name(&self) -> &str {
    "next_id"
  }

  async fn call(&self, _ctx: RequestContext) -> Result<String, ServiceError> {
    self
      .ids
      .next_id()
      .map_err(|e| ServiceError::IdGeneration(format!("{e:#}")))
  }
}

/// Issue the next ID; never fails.
pub struct NextValidIdOperation {
  ids: Arc<dyn IdSource>,
}

impl NextValidIdOperation {
  pub fn new(ids: Arc<dyn IdSource>) -> Self {
    Self { ids }
  }
}

#[async_trait]
impl Operation for NextValidIdOperation {
  type Output = String;

  fn name(&self) -> &str {
    "next_valid_id"
  }

  async fn call(&self, _ctx: RequestContext) -> Result<String, ServiceError> {
    Ok(self.ids.next_valid_id())
  }
}
