//! UUID-backed `IdSource`.

use anyhow::Result;
use uuid::Uuid;

use crate::ports::IdSource;

/// Issues random v4 UUIDs in their hyphenated form.
#[derive(Debug, Default)]
pub struct UuidIdSource;

impl UuidIdSource {
    pub const fn new() -> Self {
        Self
    }
}

impl IdSource for UuidIdSource {
    fn next_id(&self) -> Result<String> {
        Ok(self.next_valid_id())
    }

    fn next_valid_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
