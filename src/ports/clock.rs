//! Clock Port - Wall-clock Time Source
//!
//! All timestamps are UTC so processes with different local offsets
//! compare validity windows consistently.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + 'static {
  /// Current instant in UTC.
  fn now(&self) -> DateTime<Utc>;
}

/// System clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
