//! Client for the remote design document source.
//!
//! The remote source enforces a request-rate ceiling and refuses to return
//! very deep trees in one response. [`RemoteFetchClient`] works around both:
//! it fetches the page list first (shallow), then the page subtrees in small
//! sequential batches, passing every request through one shared
//! [`RateLimiter`] and retrying rate-limit rejections with exponential
//! [`Backoff`].
//!
//! The transport sits behind the [`RemoteSource`] trait; [`HttpSource`] talks
//! to the real API and `MockSource` (feature `mock`) serves an in-memory
//! document for tests.

mod client;
pub mod error;
mod limiter;
mod retry;
pub mod source;

pub use crate::client::{FetchSettings, RemoteFetchClient, SHALLOW_DEPTH};
pub use crate::limiter::RateLimiter;
pub use crate::retry::{Backoff, exponential};
#[cfg(feature = "http")]
pub use crate::source::HttpSource;
#[cfg(any(test, feature = "mock"))]
pub use crate::source::MockSource;
pub use crate::source::{NodeBatch, RemoteSource, SourceHandle};
