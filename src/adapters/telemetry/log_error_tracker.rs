//! Log Error Tracker
//!
//! `ErrorTracker` that records each captured error as an `error!`
//! event tagged with a fresh event ID, mirroring what a hosted
//! tracker would return to the caller.

use std::collections::BTreeMap;

use tracing::error;
use uuid::Uuid;

use crate::domain::ServiceError;
use crate::ports::ErrorTracker;

#[derive(Debug, Default)]
pub struct LogErrorTracker;

impl LogErrorTracker {
    pub const fn new() -> Self {
        Self
    }
}

impl ErrorTracker for LogErrorTracker {
    fn capture_error(&self, err: &ServiceError, tags: &BTreeMap<String, String>) -> String {
        let event_id = Uuid::new_v4().simple().to_string();
        error!(
            event_id = %event_id,
            error = %err,
            tags = ?tags,
            "Error captured"
        );
        event_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_capture_gets_its_own_event_id() {
        let tracker = LogErrorTracker::new();
        let tags = BTreeMap::from([("correlation_id".to_string(), "cid-9".to_string())]);

        let first = tracker.capture_error(&ServiceError::Cancelled, &tags);
        let second = tracker.capture_error(&ServiceError::Cancelled, &tags);

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }
}
