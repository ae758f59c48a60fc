use crate::error::{ErrorKind, Result};
use crate::tracker::{JobStatus, ProgressTracker, TaskId};
use exn::{OptionExt, ResultExt};
use figpack_archive::{ArchiveAssembler, ArchiveSummary, AssembleEvent, MetricsHandle, NoopMetrics, OutputSink};
use figpack_cache::SingleFlightCache;
use figpack_extract::{Document, ExportData, extract_document, extract_selected};
use figpack_remote::RemoteFetchClient;
use figpack_remote::error::ErrorKind as RemoteErrorKind;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Fetched documents by file key.
pub type DocumentCache = SingleFlightCache<String, Document, RemoteErrorKind>;

/// Raise `kind` over a failure, carrying the failure's own message so task
/// statuses name the cause.
fn raise_with_reason<T, E>(
    result: std::result::Result<T, exn::Exn<E>>,
    kind: impl FnOnce(String) -> ErrorKind,
) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.or_else(|err| {
        let reason = err.to_string();
        Err(err).or_raise(|| kind(reason))
    })
}

/// Explicit nodes to export instead of the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelection {
    pub ids: Vec<String>,
    pub depth: u32,
}

/// What to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub file_key: String,
    /// Export only these nodes. The whole document when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<NodeSelection>,
}
impl ExportRequest {
    /// Export every page of `file_key`.
    pub fn document(file_key: impl Into<String>) -> Self {
        Self { file_key: file_key.into(), selection: None }
    }

    /// Export the subtrees rooted at `ids`, `depth` levels deep.
    pub fn nodes(file_key: impl Into<String>, ids: Vec<String>, depth: u32) -> Self {
        Self { file_key: file_key.into(), selection: Some(NodeSelection { ids, depth }) }
    }
}

/// Runs exports and reports on them through a [`ProgressTracker`].
pub struct Exporter {
    client: Arc<RemoteFetchClient>,
    documents: DocumentCache,
    assembler: ArchiveAssembler,
    tracker: ProgressTracker,
    metrics: MetricsHandle,
}

impl Exporter {
    /// Documents are cached for ten minutes, fifty at most.
    pub fn new(client: RemoteFetchClient, assembler: ArchiveAssembler, tracker: ProgressTracker) -> Self {
        let documents = DocumentCache::new()
            .with_ttl(Duration::from_secs(600))
            .with_capacity(NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN));
        Self { client: Arc::new(client), documents, assembler, tracker, metrics: Arc::new(NoopMetrics) }
    }

    pub fn with_document_cache(mut self, documents: DocumentCache) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    /// Fetch and extract the records of `request`.
    #[instrument(skip(self), fields(file_key = %request.file_key))]
    pub async fn export(&self, request: &ExportRequest) -> Result<ExportData> {
        let file_key = &request.file_key;
        let data = match &request.selection {
            None => {
                let client = self.client.clone();
                let key = file_key.clone();
                let document = self
                    .documents
                    .get_or_compute(file_key.clone(), move || async move { client.fetch_document(&key).await })
                    .await;
                let document = raise_with_reason(document, |reason| ErrorKind::Fetch {
                    file_key: file_key.clone(),
                    reason,
                })?;
                extract_document(&document)
            },
            Some(selection) => {
                let nodes = self.client.fetch_nodes(file_key, &selection.ids, selection.depth).await;
                let nodes = raise_with_reason(nodes, |reason| ErrorKind::Fetch { file_key: file_key.clone(), reason })?;
                extract_selected(&nodes)
            },
        };
        tracing::info!(texts = data.texts.len(), images = data.images.len(), "Export finished");
        Ok(data)
    }

    /// Run the export stage in the background, returning the task to poll.
    ///
    /// The task goes `EXPORTING` then `READY` with the extracted data as its
    /// result, or `ERROR` (and is purged after the grace period).
    pub fn start(self: &Arc<Self>, request: ExportRequest) -> TaskId {
        let id = self.tracker.create_task();
        self.tracker.set_settings(&id, request.clone());
        self.tracker.update_progress(&id, 0, 1, JobStatus::Exporting);
        let exporter = self.clone();
        tokio::spawn(async move {
            // Failures are recorded on the task.
            let _ = exporter.export_task(&id, &request).await;
        });
        id
    }

    async fn export_task(&self, id: &TaskId, request: &ExportRequest) -> Result<Arc<ExportData>> {
        match self.export(request).await {
            Ok(data) => {
                let data = Arc::new(data);
                let images = data.images.len().min(self.assembler.settings().max_images);
                self.tracker.set_result(id, data.clone());
                // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
                self.tracker.update_progress(id, 0, u64::try_from(images).unwrap_or(0), JobStatus::Ready);
                Ok(data)
            },
            Err(err) => {
                tracing::error!(task = %id, error = %err, "Export failed");
                self.tracker.update_progress(id, 0, 0, JobStatus::Error(err.to_string()));
                self.tracker.remove_after_grace(id);
                Err(err)
            },
        }
    }

    /// Write the exported data of task `id` into `sink`.
    ///
    /// The task goes `DOWNLOADING` with live counts, then `COMPLETED` or
    /// `ERROR`; either way it is purged after the grace period. Images that
    /// can't be fetched are left out and listed in the summary's warnings.
    #[instrument(skip(self, sink), fields(task = %id))]
    pub async fn stream_archive<S: OutputSink + 'static>(&self, id: &TaskId, sink: S) -> Result<ArchiveSummary> {
        let data = self.tracker.get_result(id).ok_or_raise(|| ErrorKind::NotReady(id.to_string()))?;
        let started = Instant::now();
        let outcome = self.archive(id, &data, sink).await;
        self.metrics.archive_duration(started.elapsed());
        match &outcome {
            Ok(summary) => {
                self.metrics.archive_succeeded();
                let total = summary.images_written + summary.images_skipped;
                self.tracker.update_progress(id, total, total, JobStatus::Completed);
                for warning in &summary.warnings {
                    tracing::warn!(task = %id, warning, "Left out of archive");
                }
            },
            Err(err) => {
                self.metrics.archive_failed();
                tracing::error!(task = %id, error = %err, "Archive failed");
                let progress = self.tracker.get_progress(id);
                let status = JobStatus::Error(err.to_string());
                self.tracker.update_progress(id, progress.current, progress.total, status);
            },
        }
        self.tracker.remove_after_grace(id);
        outcome
    }

    async fn archive<S>(&self, id: &TaskId, data: &ExportData, sink: S) -> Result<ArchiveSummary>
    where
        S: OutputSink + 'static,
    {
        let mut events = std::pin::pin!(self.assembler.assemble(data, sink));
        let mut total = 0;
        while let Some(event) = events.next().await {
            let event = raise_with_reason(event, |reason| ErrorKind::Archive { task: id.to_string(), reason })?;
            match event {
                AssembleEvent::DownloadsQueued(queued) => {
                    total = queued;
                    self.tracker.update_progress(id, 0, total, JobStatus::Downloading);
                },
                AssembleEvent::AssetWritten { completed, .. } | AssembleEvent::AssetSkipped { completed, .. } => {
                    self.tracker.update_progress(id, completed, total, JobStatus::Downloading);
                },
                AssembleEvent::Complete(summary) => return Ok(summary),
                _ => {},
            }
        }
        exn::bail!(ErrorKind::Archive { task: id.to_string(), reason: "archive stream ended early".to_string() })
    }

    /// Export `request` and stream it into `sink` in one go.
    pub async fn run<S>(&self, request: ExportRequest, sink: S) -> Result<(TaskId, ArchiveSummary)>
    where
        S: OutputSink + 'static,
    {
        let id = self.tracker.create_task();
        self.tracker.set_settings(&id, request.clone());
        self.tracker.update_progress(&id, 0, 1, JobStatus::Exporting);
        self.export_task(&id, &request).await?;
        let summary = self.stream_archive(&id, sink).await?;
        Ok((id, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::JobProgress;
    use figpack_archive::sink::MemorySink;
    use figpack_archive::{ArchiveSettings, CountingMetrics, FormatterRegistry};
    use figpack_download::{AssetDownloadManager, DownloadSettings, MockAssetSource};
    use figpack_extract::{Node, Page};
    use figpack_remote::source::{MockOp, MockSource};
    use figpack_remote::{FetchSettings, RateLimiter};

    fn document() -> Document {
        Document::new(
            "12",
            vec![
                Page::new(
                    "0:1",
                    "Home",
                    vec![Node::container("1:1", "Hero").with_children(vec![
                        Node::text("1:2", "Title", "Welcome"),
                        Node::image("1:3", "Logo", "https://cdn/logo.png"),
                    ])],
                ),
                Page::new(
                    "0:2",
                    "About",
                    vec![Node::container("2:1", "Team").with_children(vec![Node::image(
                        "2:2",
                        "Portrait",
                        "https://cdn/missing.png",
                    )])],
                ),
            ],
        )
    }

    struct Fixture {
        exporter: Arc<Exporter>,
        source: Arc<MockSource>,
        assets: Arc<MockAssetSource>,
        metrics: Arc<CountingMetrics>,
    }

    fn fixture(source: MockSource) -> Fixture {
        let source = Arc::new(source);
        let assets = Arc::new(MockAssetSource::new().with_assets([("https://cdn/logo.png", b"logo".to_vec())]));
        let limiter = Arc::new(RateLimiter::new(10_000.0, 10_000).unwrap());
        let client = RemoteFetchClient::new(source.clone(), limiter.clone(), FetchSettings::default());
        let downloads = AssetDownloadManager::new(
            assets.clone(),
            limiter,
            DownloadSettings { start_delay: Duration::ZERO, ..DownloadSettings::default() },
        );
        let metrics = Arc::new(CountingMetrics::new());
        let assembler = ArchiveAssembler::new(downloads, FormatterRegistry::default(), ArchiveSettings::default())
            .with_metrics(metrics.clone());
        let exporter = Exporter::new(client, assembler, ProgressTracker::new()).with_metrics(metrics.clone());
        Fixture { exporter: Arc::new(exporter), source, assets, metrics }
    }

    async fn wait_until_settled(tracker: &ProgressTracker, id: &TaskId) -> JobProgress {
        loop {
            let progress = tracker.get_progress(id);
            if !matches!(progress.status, JobStatus::Exporting) {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_with_missing_asset_as_warning() {
        let fixture = fixture(MockSource::new(document()));
        let sink = MemorySink::new();
        let (id, summary) = fixture.exporter.run(ExportRequest::document("abc"), sink.clone()).await.unwrap();

        assert_eq!(fixture.exporter.tracker().get_progress(&id), JobProgress::new(2, 2, JobStatus::Completed));
        assert_eq!((summary.images_written, summary.images_skipped), (1, 1));
        assert_eq!(summary.warnings.len(), 1);
        assert!(sink.entry("Home/Hero/Logo_id_1_3.png").is_some());
        assert!(sink.entry("About/Team/Portrait_id_2_2.png").is_none());
        assert!(sink.is_finished());
        assert_eq!(fixture.assets.fetches("https://cdn/missing.png"), 1);

        let snapshot = fixture.metrics.snapshot();
        assert_eq!((snapshot.archives_succeeded, snapshot.images_downloaded, snapshot.images_skipped), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_document_completes_with_no_records() {
        let fixture = fixture(MockSource::new(Document::new("3", vec![])));
        let sink = MemorySink::new();
        let (id, summary) = fixture.exporter.run(ExportRequest::document("empty"), sink.clone()).await.unwrap();

        assert_eq!(fixture.exporter.tracker().get_progress(&id), JobProgress::new(0, 0, JobStatus::Completed));
        assert_eq!(summary.images_written, 0);
        let metadata: ExportData = serde_json::from_slice(&sink.entry("figma.json").unwrap()).unwrap();
        assert!(metadata.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_documents_are_fetched_once_per_file_key() {
        let fixture = fixture(MockSource::new(document()));
        let request = ExportRequest::document("abc");
        let (first, second) = tokio::join!(fixture.exporter.export(&request), fixture.exporter.export(&request));
        assert_eq!(first.unwrap(), second.unwrap());
        fixture.exporter.export(&request).await.unwrap();
        assert_eq!(fixture.source.file_calls(), 1);
        assert!(fixture.exporter.documents().contains(&"abc".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_selected_nodes_bypass_the_cache() {
        let fixture = fixture(MockSource::new(document()));
        let request = ExportRequest::nodes("abc", vec!["1:1".to_string()], 5);
        let data = fixture.exporter.export(&request).await.unwrap();

        assert_eq!(data.version, "v1");
        assert_eq!(data.texts.len(), 1);
        assert_eq!(data.texts[0].page_name, "Selected");
        assert_eq!(fixture.source.file_calls(), 0);
        assert!(fixture.exporter.documents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reaches_ready_then_streams() {
        let fixture = fixture(MockSource::new(document()));
        let tracker = fixture.exporter.tracker().clone();
        let id = fixture.exporter.start(ExportRequest::document("abc"));
        assert_eq!(tracker.get_settings(&id), Some(ExportRequest::document("abc")));

        assert_eq!(wait_until_settled(&tracker, &id).await, JobProgress::new(0, 2, JobStatus::Ready));
        assert_eq!(tracker.get_result(&id).unwrap().images.len(), 2);

        fixture.exporter.stream_archive(&id, MemorySink::new()).await.unwrap();
        assert_eq!(tracker.get_progress(&id).status, JobStatus::Completed);
        tokio::time::sleep(crate::DEFAULT_REMOVAL_GRACE + Duration::from_secs(1)).await;
        assert_eq!(tracker.get_progress(&id).status, JobStatus::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_export_reports_error_status() {
        let source = MockSource::new(document()).with_failures(MockOp::File, [RemoteErrorKind::NotFound("abc".into())]);
        let fixture = fixture(source);
        let tracker = fixture.exporter.tracker().clone();
        let id = fixture.exporter.start(ExportRequest::document("abc"));

        let progress = wait_until_settled(&tracker, &id).await;
        assert!(matches!(
            &progress.status,
            JobStatus::Error(message) if message == "failed to fetch design file abc: not found: abc"
        ));
        assert!(progress.status.is_terminal());
        let err = fixture.exporter.stream_archive(&id, MemorySink::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotReady(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_fails_the_task() {
        let fixture = fixture(MockSource::new(document()));
        let sink = MemorySink::new().failing_on("Home/Hero/Logo_id_1_3.png");
        let err = fixture.exporter.run(ExportRequest::document("abc"), sink.clone()).await.unwrap_err();

        assert!(matches!(&*err, ErrorKind::Archive { reason, .. } if reason.contains("Home/Hero/Logo_id_1_3.png")));
        assert!(!sink.is_finished());
        assert_eq!(fixture.metrics.snapshot().archives_failed, 1);
        assert_eq!(fixture.exporter.tracker().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_archive_error_status_names_the_cause() {
        let fixture = fixture(MockSource::new(document()));
        let tracker = fixture.exporter.tracker().clone();
        let id = fixture.exporter.start(ExportRequest::document("abc"));
        wait_until_settled(&tracker, &id).await;

        let sink = MemorySink::new().failing_on("figma.json");
        fixture.exporter.stream_archive(&id, sink).await.unwrap_err();
        assert!(matches!(
            tracker.get_progress(&id).status,
            JobStatus::Error(message) if message.contains("failed to write archive entry: figma.json")
        ));
    }
}
