//! Errors raised by the synchronization core.

use crate::polarion::PolarionError;
use crate::report::ReportError;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the transformer and exporter.
///
/// None of these are recovered from: a failure anywhere aborts the export.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The report could not be read or has an unexpected structure.
    #[error(transparent)]
    Report(#[from] ReportError),

    /// A remote call failed (after retries, where applicable).
    #[error(transparent)]
    Polarion(#[from] PolarionError),

    /// A lookup that must be unique matched several records.
    #[error("{count} records match {query:?}; narrow the query")]
    Ambiguous { query: String, count: usize },

    /// The overall status of a test case is derived, never assigned.
    #[error("Can not set status manually for {0}")]
    StatusOverride(String),

    /// A test case has no remote counterpart yet.
    #[error("{0} is not bound to a remote test case")]
    Unbound(String),

    /// The test run to update does not exist.
    #[error("No test run matches {0:?}")]
    MissingRun(String),
}
