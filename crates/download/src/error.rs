//! Asset Download Error Types
//!
//! Structured errors using `exn` for automatic location tracking. Per-asset
//! failures never escape the download manager; they are reported as skipped
//! assets carrying one of these kinds.

use derive_more::{Display, Error};

/// An asset download error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for asset download operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why an asset couldn't be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ErrorKind {
    /// HTTP 429.
    #[display("rate limited")]
    RateLimited,
    /// HTTP 413: the source refused to serve a payload this large right now.
    #[display("payload refused as too large by source")]
    SizeLimited,
    #[display("asset not found")]
    NotFound,
    #[display("access to asset forbidden")]
    Forbidden,
    /// Any other 4xx.
    #[display("client error: HTTP {_0}")]
    Client(#[error(not(source))] u16),
    /// 5xx.
    #[display("server error: HTTP {_0}")]
    Server(#[error(not(source))] u16),
    /// The payload exceeded the configured maximum size.
    #[display("asset larger than {_0} bytes")]
    TooLarge(#[error(not(source))] u64),
    #[display("asset response was empty")]
    Empty,
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    #[display("asset has no URL")]
    MissingUrl,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::SizeLimited | Self::Server(_) | Self::Empty | Self::Network(_))
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            413 => Self::SizeLimited,
            404 | 410 => Self::NotFound,
            401 | 403 => Self::Forbidden,
            500.. => Self::Server(status),
            _ => Self::Client(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(429, ErrorKind::RateLimited, true)]
    #[case(413, ErrorKind::SizeLimited, true)]
    #[case(503, ErrorKind::Server(503), true)]
    #[case(404, ErrorKind::NotFound, false)]
    #[case(403, ErrorKind::Forbidden, false)]
    #[case(400, ErrorKind::Client(400), false)]
    fn test_status_classification(#[case] status: u16, #[case] kind: ErrorKind, #[case] retryable: bool) {
        let classified = ErrorKind::from_status(status);
        assert_eq!(classified, kind);
        assert_eq!(classified.is_retryable(), retryable);
    }

    #[test]
    fn test_too_large_is_fatal() {
        assert!(!ErrorKind::TooLarge(10).is_retryable());
    }
}
