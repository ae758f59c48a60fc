//! Asset downloads under a concurrency bound.
//!
//! [`AssetDownloadManager`] takes a list of [`DownloadTask`]s and fetches
//! them with at most `max_concurrent` in flight, each distinct URL fetched
//! once per run, every attempt passing through the shared
//! [`RateLimiter`](figpack_remote::RateLimiter). Failures are retried with
//! exponential backoff when they look transient and otherwise skipped; a
//! failed asset never fails the run.

pub mod error;
mod manager;
pub mod source;

pub use crate::manager::{AssetDownloadManager, DownloadEvent, DownloadSettings, DownloadTask};
#[cfg(feature = "http")]
pub use crate::source::HttpAssetSource;
#[cfg(any(test, feature = "mock"))]
pub use crate::source::MockAssetSource;
pub use crate::source::{AssetHandle, AssetSource};
