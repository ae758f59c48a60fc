//! Archive Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Everything that escapes [`assemble`](crate::ArchiveAssembler::assemble)
//! is raised as [`ErrorKind::ArchiveCreation`], naming the specific failure
//! that is also kept as its child.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Top-level failure of an archive; the output may be partially written.
    #[display("archive creation failed: {_0}")]
    ArchiveCreation(#[error(not(source))] String),
    #[display("failed to serialize archive metadata")]
    Metadata,
    #[display("failed to write archive entry: {_0}")]
    Write(#[error(not(source))] String),
    #[display("failed to finalize archive")]
    Finish,
    /// The sink was written to after being finalized.
    #[display("archive already finalized")]
    Finished,
    #[display("unsupported index format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    #[display("failed to generate {_0} index")]
    Index(#[error(not(source))] String),
    /// The blocking task performing a write didn't complete.
    #[display("archive writer task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
