use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::retry::{Backoff, with_backoff};
use crate::source::{NodeBatch, SourceHandle};
use figpack_extract::{Document, Node, Page};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Depth of the first, page-listing fetch.
pub const SHALLOW_DEPTH: u32 = 1;

/// Tuning for [`RemoteFetchClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Pages requested per subtree fetch.
    pub batch_size: NonZeroUsize,
    /// Depth of each page subtree fetch.
    pub deep_depth: u32,
    /// Pause before every batch after the first.
    pub batch_delay: Duration,
    pub backoff: Backoff,
}
impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(3).unwrap_or(NonZeroUsize::MIN),
            deep_depth: 10,
            batch_delay: Duration::from_secs(2),
            backoff: Backoff::default(),
        }
    }
}

/// Assembles complete documents from a source that limits response depth.
///
/// Fetching happens in two phases:
/// 1. A shallow fetch (depth [`SHALLOW_DEPTH`]) lists the pages.
/// 2. The pages are fetched `batch_size` at a time, one batch after another
///    with `batch_delay` in between, and their subtrees spliced back into the
///    page list.
///
/// Every request goes through the shared [`RateLimiter`] and is retried on
/// rate-limit rejections according to [`Backoff`]. Anything else (including a
/// batch that stays rate limited) fails the whole fetch: a partial document
/// would silently drop content from the export.
pub struct RemoteFetchClient {
    source: SourceHandle,
    limiter: Arc<RateLimiter>,
    settings: FetchSettings,
}

impl RemoteFetchClient {
    pub fn new(source: SourceHandle, limiter: Arc<RateLimiter>, settings: FetchSettings) -> Self {
        Self { source, limiter, settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch the complete document identified by `file_key`.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn fetch_document(&self, file_key: &str) -> Result<Document> {
        let shallow = with_backoff(&self.limiter, &self.settings.backoff, "shallow fetch", || {
            self.source.fetch_file(file_key, SHALLOW_DEPTH)
        })
        .await?;
        if shallow.pages.is_empty() {
            tracing::info!(file_key, "Document has no pages");
            return Ok(shallow);
        }

        let ids: Vec<String> = shallow.pages.iter().map(|page| page.id.clone()).collect();
        let batches: Vec<&[String]> = ids.chunks(self.settings.batch_size.get()).collect();
        tracing::info!(file_key, pages = ids.len(), batches = batches.len(), "Fetching page contents");

        let mut fetched = Vec::with_capacity(batches.len());
        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            tracing::debug!(file_key, batch = index + 1, pages = batch.len(), "Fetching page batch");
            let nodes = with_backoff(&self.limiter, &self.settings.backoff, "batch fetch", || {
                self.source.fetch_nodes(file_key, batch, self.settings.deep_depth)
            })
            .await?;
            fetched.push(nodes);
        }

        Ok(reassemble(shallow, &fetched))
    }

    /// Fetch an explicit selection of nodes, `depth` levels deep, in one
    /// request. Nodes come back in the order requested; identifiers the
    /// source couldn't resolve are logged and skipped.
    #[instrument(skip(self, ids), fields(source = self.source.name(), ids = ids.len()))]
    pub async fn fetch_nodes(&self, file_key: &str, ids: &[String], depth: u32) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut batch = with_backoff(&self.limiter, &self.settings.backoff, "node fetch", || {
            self.source.fetch_nodes(file_key, ids, depth)
        })
        .await?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                let node = batch.remove(id);
                if node.is_none() {
                    tracing::warn!(file_key, node_id = %id, "Requested node not returned by source");
                }
                node
            })
            .collect())
    }
}

/// Splice each shallow page's subtree in from whichever batch returned it.
fn reassemble(shallow: Document, batches: &[NodeBatch]) -> Document {
    let pages = shallow
        .pages
        .into_iter()
        .filter_map(|page| match batches.iter().find_map(|batch| batch.get(&page.id)) {
            Some(node) => Some(Page::new(page.id, node.name.clone(), node.children.clone())),
            None => {
                tracing::warn!(page_id = %page.id, page_name = %page.name, "Page missing from every batch, dropping");
                None
            },
        })
        .collect();
    Document::new(shallow.version, pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::{MockOp, MockSource};
    use rstest::rstest;

    fn document(pages: usize) -> Document {
        Document::new(
            "99",
            (0..pages)
                .map(|n| {
                    Page::new(
                        format!("0:{n}"),
                        format!("Page {n}"),
                        vec![Node::container(format!("{n}:1"), "Frame").with_children(vec![Node::text(
                            format!("{n}:2"),
                            "Title",
                            "Hello",
                        )])],
                    )
                })
                .collect(),
        )
    }

    fn client(source: Arc<MockSource>, batch_size: usize) -> RemoteFetchClient {
        let settings = FetchSettings {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            ..FetchSettings::default()
        };
        RemoteFetchClient::new(source, Arc::new(RateLimiter::new(10_000.0, 10_000).unwrap()), settings)
    }

    #[rstest]
    #[case(0, 3, 0)]
    #[case(1, 3, 1)]
    #[case(3, 3, 1)]
    #[case(4, 3, 2)]
    #[case(7, 3, 3)]
    #[case(10, 1, 10)]
    #[case(5, 10, 1)]
    #[tokio::test(start_paused = true)]
    async fn test_batch_count_is_pages_over_batch_size(
        #[case] pages: usize,
        #[case] batch_size: usize,
        #[case] expected_calls: usize,
    ) {
        let source = Arc::new(MockSource::new(document(pages)));
        let fetched = client(source.clone(), batch_size).fetch_document("key").await.unwrap();
        assert_eq!(source.file_calls(), 1);
        assert_eq!(source.node_calls(), expected_calls);
        assert_eq!(fetched, document(pages));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_spaced_by_delay() {
        let source = Arc::new(MockSource::new(document(7)));
        let start = tokio::time::Instant::now();
        client(source.clone(), 3).fetch_document("key").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2 * 2));
        assert_eq!(source.node_requests()[2], ["0:6"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_list_returns_shallow_document() {
        let source = Arc::new(MockSource::new(Document::new("5", vec![])));
        let fetched = client(source.clone(), 3).fetch_document("key").await.unwrap();
        assert!(fetched.pages.is_empty());
        assert_eq!(fetched.version, "5");
        assert_eq!(source.node_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_batch_eventually_succeeds() {
        let source = Arc::new(
            MockSource::new(document(2))
                .with_failures(MockOp::Nodes, [ErrorKind::RateLimited(None), ErrorKind::RateLimited(None)]),
        );
        let start = tokio::time::Instant::now();
        let fetched = client(source.clone(), 3).fetch_document("key").await.unwrap();
        let min = Backoff::default().min;
        assert!(start.elapsed() >= min + 2 * min);
        assert_eq!(source.node_calls(), 3);
        assert_eq!(fetched.pages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_shallow_fetch_is_retried() {
        let source = Arc::new(MockSource::new(document(1)).with_failures(MockOp::File, [ErrorKind::RateLimited(None)]));
        client(source.clone(), 3).fetch_document("key").await.unwrap();
        assert_eq!(source.file_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_failure_fails_whole_fetch() {
        let source = Arc::new(
            MockSource::new(document(6)).with_failures(MockOp::Nodes, [ErrorKind::Forbidden("nodes".to_string())]),
        );
        let err = client(source.clone(), 3).fetch_document("key").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Forbidden(_)));
        assert_eq!(source.node_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_whole_fetch() {
        let source =
            Arc::new(MockSource::new(document(1)).with_failures(MockOp::Nodes, vec![ErrorKind::RateLimited(None); 10]));
        let err = client(source.clone(), 3).fetch_document("key").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RetriesExhausted(7)));
        assert_eq!(source.node_calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_missing_from_batches_are_dropped() {
        let source = Arc::new(MockSource::new(document(4)).with_hidden_pages(["0:2"]));
        let fetched = client(source, 3).fetch_document("key").await.unwrap();
        assert_eq!(fetched.page_ids(), ["0:0", "0:1", "0:3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_nodes_keeps_requested_order() {
        let source = Arc::new(MockSource::new(document(3)));
        let ids = vec!["2:1".to_string(), "missing".to_string(), "0:1".to_string()];
        let nodes = client(source.clone(), 3).fetch_nodes("key", &ids, 2).await.unwrap();
        assert_eq!(nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["2:1", "0:1"]);
        assert_eq!(source.node_calls(), 1);
    }
}
