//! Export Job Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An export job error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for export job operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// The document or node selection couldn't be fetched.
    #[display("failed to fetch design file {file_key}: {reason}")]
    Fetch { file_key: String, reason: String },
    #[display("failed to build archive for task {task}: {reason}")]
    Archive { task: String, reason: String },
    /// Archiving was requested for a task that has no export result.
    #[display("task {_0} has not finished exporting")]
    NotReady(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
