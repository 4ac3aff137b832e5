//! Backend Probe Port - Health Check Interface
//!
//! One implementation per monitored backend. A probe never fails:
//! network and protocol problems are reported as KO reports, and a
//! backend disabled by configuration yields a single Deactivated
//! report without touching the network.

use async_trait::async_trait;

use crate::domain::{Report, RequestContext, Unit};

/// Executes the checks for one backend.
#[async_trait]
pub trait BackendProbe: Send + Sync + 'static {
  /// The unit this probe reports for.
  fn unit(&self) -> Unit;

  /// Run every check for the backend and time each one.
  ///
  /// Implementations enforce their own timeout and return promptly
  /// once `ctx` is cancelled.
  async fn health_checks(&self, ctx: &RequestContext) -> Vec<Report>;
}
