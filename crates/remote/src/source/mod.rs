//! Transport seam between the fetch client and the remote API.

#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(feature = "http")]
mod wire;

#[cfg(feature = "http")]
pub use self::http::HttpSource;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockOp, MockSource};
use crate::error::Result;
use async_trait::async_trait;
use figpack_extract::{Document, Node};
use std::collections::HashMap;
use std::sync::Arc;

/// Nodes returned by a subtree fetch, keyed by the requested identifier.
/// Identifiers the source couldn't resolve are simply absent.
pub type NodeBatch = HashMap<String, Node>;

pub type SourceHandle = Arc<dyn RemoteSource + Send + Sync>;

/// The two logical operations the remote API offers.
///
/// Implementations report a rate-limit rejection as
/// [`ErrorKind::RateLimited`](crate::error::ErrorKind::RateLimited) so callers
/// can tell it apart from every other failure. They must not retry or
/// rate-limit on their own; [`RemoteFetchClient`](crate::RemoteFetchClient)
/// does both.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Fetch the document with its tree cut off `depth` levels below the root
    /// (depth 1 lists the pages and nothing inside them).
    async fn fetch_file(&self, file_key: &str, depth: u32) -> Result<Document>;

    /// Fetch the subtrees rooted at `ids`, each cut off `depth` levels below
    /// its root, in a single request.
    async fn fetch_nodes(&self, file_key: &str, ids: &[String], depth: u32) -> Result<NodeBatch>;
}
