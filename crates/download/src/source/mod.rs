#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(feature = "http")]
pub use self::http::HttpAssetSource;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockAssetSource;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub type AssetHandle = Arc<dyn AssetSource + Send + Sync>;

/// Where asset bytes come from.
///
/// Implementations make exactly one request per call and classify failures
/// with [`ErrorKind`](crate::error::ErrorKind); retrying and rate limiting are
/// the manager's job.
#[async_trait]
pub trait AssetSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the bytes at `url`, failing with
    /// [`TooLarge`](crate::error::ErrorKind::TooLarge) as soon as the payload
    /// is known to exceed `max_bytes`.
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Bytes>;
}
