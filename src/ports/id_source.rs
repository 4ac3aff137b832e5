//! ID Source Port - Unique Identifier Generation
//!
//! The generation algorithm lives in an external, already-hardened
//! library. This service only consumes it through two calls.

/// Supplier of unique identifiers.
pub trait IdSource: Send + Sync + 'static {
  /// Produce the next identifier.
  ///
  /// # Errors
  /// Returns error when the generator cannot issue an ID (e.g. clock
  /// moved backwards).
  fn next_id(&self) -> anyhow::Result<String>;

  /// Produce the next identifier, never failing.
  ///
  /// Used for correlation IDs, where a request must not fail because
  /// the generator is momentarily unable to issue.
  fn next_valid_id(&self) -> String;
}
