//! Remote Source Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The kinds are `Clone` so a single failed fetch can be
//! handed to every caller that was waiting on it.

use derive_more::{Display, Error};
use std::time::Duration;

/// A remote fetch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote fetch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Only [`RateLimited`](ErrorKind::RateLimited) is ever retried; every other
/// kind fails the fetch immediately.
#[derive(Debug, Clone, Display, Error)]
pub enum ErrorKind {
    /// The source rejected the request for exceeding its rate ceiling,
    /// optionally saying how long to wait.
    #[display("rate limited by remote source")]
    RateLimited(#[error(not(source))] Option<Duration>),
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("access forbidden: {_0}")]
    Forbidden(#[error(not(source))] String),
    /// Any other non-success HTTP status.
    #[display("remote source responded with HTTP {_0}")]
    Http(#[error(not(source))] u16),
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The response body couldn't be decoded.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    #[display("invalid rate limit: {_0}")]
    InvalidRate(#[error(not(source))] String),
    /// Still rate limited after the configured number of retries.
    #[display("still rate limited after {_0} attempts")]
    RetriesExhausted(#[error(not(source))] u32),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Server-provided wait hint attached to a rate-limit rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(after) => *after,
            _ => None,
        }
    }
}
