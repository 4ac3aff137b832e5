//! Persistence Adapters - File-backed Health Report Table
//!
//! Implements the `ReportStore` port with a single JSON table written
//! atomically (tmp file + rename). No database dependency; the table
//! survives restarts and is shared by replicas on the same volume.

pub mod report_store;

pub use report_store::FileReportStore;
