use crate::error::{ErrorKind, Result};
use crate::index::FormatterRegistry;
use crate::metrics::{MetricsHandle, NoopMetrics};
use crate::naming::EntryNamer;
use crate::sink::{OutputSink, SharedSink};
use async_stream::stream;
use exn::ResultExt;
use figpack_download::error::ErrorKind as DownloadErrorKind;
use figpack_download::{AssetDownloadManager, DownloadEvent, DownloadTask};
use figpack_extract::ExportData;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// Log a progress line every this many resolved images.
const PROGRESS_EVERY: u64 = 100;

/// What goes into an archive besides the images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    /// Images past this many (in record order) are left out of the archive.
    pub max_images: usize,
    pub include_index: bool,
    /// Index formats to generate, looked up in the [`FormatterRegistry`].
    pub index_formats: Vec<String>,
    /// Entry name of the JSON metadata.
    pub metadata_file: String,
}
impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            max_images: 5000,
            include_index: true,
            index_formats: vec!["csv".to_string()],
            metadata_file: "figma.json".to_string(),
        }
    }
}

/// Archive layout decided before anything is downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// The input with `archive_path` filled in for every image that will be
    /// downloaded.
    pub data: ExportData,
    pub tasks: Vec<DownloadTask>,
    /// Images left out because of `max_images`.
    pub dropped: usize,
}

/// Assign archive paths to the first `max_images` images, in record order.
pub fn plan(data: &ExportData, max_images: usize) -> Plan {
    let mut data = data.clone();
    let mut namer = EntryNamer::new();
    let mut tasks = Vec::with_capacity(data.images.len().min(max_images));
    for image in data.images.iter_mut().take(max_images) {
        let path = namer.name_for(image);
        tasks.push(DownloadTask::new(image.image_url.clone().unwrap_or_default(), path.clone()));
        image.archive_path = Some(path);
    }
    let dropped = data.images.len().saturating_sub(max_images);
    Plan { data, tasks, dropped }
}

/// Outcome of a finished archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Entry names in write order.
    pub entries: Vec<String>,
    pub images_written: u64,
    pub images_skipped: u64,
    pub images_dropped: u64,
    /// Everything that was left out, one line each.
    pub warnings: Vec<String>,
}

/// Progress events emitted by [`ArchiveAssembler::assemble`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`MetadataWritten`](Self::MetadataWritten), exactly once.
/// 3. [`IndexWritten`](Self::IndexWritten) or [`IndexSkipped`](Self::IndexSkipped)
///    once per configured format, unless indexes are disabled.
/// 4. [`DownloadsQueued`](Self::DownloadsQueued), exactly once, with the
///    number of images that will be resolved.
/// 5. [`AssetWritten`](Self::AssetWritten) or [`AssetSkipped`](Self::AssetSkipped)
///    once per queued image, in completion order.
/// 6. [`Complete`](Self::Complete), once the container has been finalized.
///
/// An error terminates the stream early, in which case [`Complete`](Self::Complete)
/// is never emitted and the container must be treated as unusable.
#[derive(Debug, Clone)]
pub enum AssembleEvent {
    Started,
    MetadataWritten { name: String },
    IndexWritten { format: String, name: String },
    IndexSkipped { format: String, reason: String },
    DownloadsQueued(u64),
    AssetWritten { path: String, completed: u64, total: u64 },
    AssetSkipped { url: String, path: String, reason: DownloadErrorKind, completed: u64, total: u64 },
    Complete(ArchiveSummary),
}

/// Writes extracted data, its indexes and its images into one container.
pub struct ArchiveAssembler {
    downloads: AssetDownloadManager,
    formatters: FormatterRegistry,
    settings: ArchiveSettings,
    metrics: MetricsHandle,
}

impl ArchiveAssembler {
    pub fn new(downloads: AssetDownloadManager, formatters: FormatterRegistry, settings: ArchiveSettings) -> Self {
        Self { downloads, formatters, settings, metrics: Arc::new(NoopMetrics) }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.settings
    }

    pub fn plan(&self, data: &ExportData) -> Plan {
        plan(data, self.settings.max_images)
    }

    /// Stream [`AssembleEvent`]s while writing `data` into `sink`.
    ///
    /// Unsupported or failing index formats and images that can't be fetched
    /// are reported and left out. A failure to write to or finalize the sink
    /// ends the stream with [`ErrorKind::ArchiveCreation`].
    pub fn assemble<'a, S: OutputSink + 'static>(
        &'a self,
        data: &'a ExportData,
        sink: S,
    ) -> impl Stream<Item = Result<AssembleEvent>> + Send + 'a {
        // `rustfmt` does not format macro-specific syntax such as
        // `for await` even using the parentheses trick.
        stream! {
            for await event in self.assemble_inner(data, sink) {
                yield event.or_else(|e| {
                    let reason = e.to_string();
                    Err(e).or_raise(|| ErrorKind::ArchiveCreation(reason))
                });
            }
        }
    }

    fn assemble_inner<'a, S: OutputSink + 'static>(
        &'a self,
        data: &'a ExportData,
        sink: S,
    ) -> impl Stream<Item = Result<AssembleEvent>> + Send + 'a {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            yield Ok(AssembleEvent::Started);
            let sink = SharedSink::new(sink);
            let plan = self.plan(data);
            let mut summary = ArchiveSummary::default();

            let metadata = match serde_json::to_vec_pretty(&plan.data).or_raise(|| ErrorKind::Metadata) {
                Ok(metadata) => metadata,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            let name = self.settings.metadata_file.clone();
            match put(&sink, &mut summary, name.clone(), metadata).await {
                Ok(_) => yield Ok(AssembleEvent::MetadataWritten { name }),
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }

            if self.settings.include_index {
                for format in &self.settings.index_formats {
                    if !self.formatters.is_format_supported(format) {
                        tracing::warn!(format, "Unsupported index format, skipping");
                        let reason = ErrorKind::UnsupportedFormat(format.clone()).to_string();
                        summary.warnings.push(format!("index {format} skipped: {reason}"));
                        yield Ok(AssembleEvent::IndexSkipped { format: format.clone(), reason });
                        continue;
                    }
                    let name = self.formatters.file_name(format);
                    let output = match self.formatters.generate(format, &plan.data) {
                        Ok(output) => output,
                        Err(e) => {
                            tracing::warn!(format, error = %e, "Index generation failed, skipping");
                            summary.warnings.push(format!("index {format} skipped: {e}"));
                            yield Ok(AssembleEvent::IndexSkipped { format: format.clone(), reason: e.to_string() });
                            continue;
                        },
                    };
                    match put(&sink, &mut summary, name.clone(), output).await {
                        Ok(true) => yield Ok(AssembleEvent::IndexWritten { format: format.clone(), name }),
                        Ok(false) => {
                            let reason = "empty output".to_string();
                            yield Ok(AssembleEvent::IndexSkipped { format: format.clone(), reason });
                        },
                        Err(e) => {
                            yield Err(e);
                            return;
                        },
                    }
                }
            }

            if plan.dropped > 0 {
                tracing::warn!(
                    dropped = plan.dropped,
                    max_images = self.settings.max_images,
                    "Too many images, leaving the rest out"
                );
                let (dropped, limit) = (plan.dropped, self.settings.max_images);
                summary.warnings.push(format!("{dropped} images over the limit of {limit} left out"));
            }
            summary.images_dropped = u64::try_from(plan.dropped).unwrap_or(u64::MAX);
            // Infallible: a usize (either 32- or 64-bit) will always fit in a u64.
            let total = u64::try_from(plan.tasks.len()).unwrap_or(0);
            yield Ok(AssembleEvent::DownloadsQueued(total));

            let mut downloads = std::pin::pin!(self.downloads.download(plan.tasks));
            while let Some(event) = downloads.next().await {
                let completed = event.completed();
                match event {
                    DownloadEvent::Fetched { task, data, .. } => {
                        let bytes = u64::try_from(data.len()).unwrap_or(u64::MAX);
                        match put(&sink, &mut summary, task.path.clone(), data).await {
                            Ok(true) => {
                                summary.images_written += 1;
                                self.metrics.image_downloaded(bytes);
                                yield Ok(AssembleEvent::AssetWritten { path: task.path, completed, total });
                            },
                            Ok(false) => {
                                summary.images_skipped += 1;
                                self.metrics.image_skipped();
                                let (url, path, reason) = (task.url, task.path, DownloadErrorKind::Empty);
                                yield Ok(AssembleEvent::AssetSkipped { url, path, reason, completed, total });
                            },
                            Err(e) => {
                                yield Err(e);
                                return;
                            },
                        }
                    },
                    DownloadEvent::Skipped { task, reason, .. } => {
                        summary.images_skipped += 1;
                        self.metrics.image_skipped();
                        summary.warnings.push(format!("image {} ({}) skipped: {reason}", task.path, task.url));
                        let (url, path) = (task.url, task.path);
                        yield Ok(AssembleEvent::AssetSkipped { url, path, reason, completed, total });
                    },
                }
                if completed % PROGRESS_EVERY == 0 {
                    tracing::info!(completed, total, "Archiving images");
                }
            }

            if let Err(e) = sink.finish().await {
                yield Err(e);
                return;
            }
            tracing::info!(
                entries = summary.entries.len(),
                images_written = summary.images_written,
                images_skipped = summary.images_skipped,
                images_dropped = summary.images_dropped,
                "Archive complete"
            );
            yield Ok(AssembleEvent::Complete(summary));
        })
    }
}

/// Write one entry, leaving out blank names and empty payloads with a warning.
/// Returns whether the entry was written.
async fn put<S: OutputSink + 'static>(
    sink: &SharedSink<S>,
    summary: &mut ArchiveSummary,
    name: String,
    data: impl AsRef<[u8]> + Send + 'static,
) -> Result<bool> {
    if name.trim().is_empty() || data.as_ref().is_empty() {
        tracing::warn!(entry = %name, "Empty archive entry, skipping");
        summary.warnings.push(format!("entry {name:?} skipped: empty"));
        return Ok(false);
    }
    sink.write(name.clone(), data).await?;
    summary.entries.push(name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use figpack_download::{DownloadSettings, MockAssetSource};
    use figpack_extract::{ImageRecord, TextRecord};
    use figpack_remote::RateLimiter;
    use rstest::rstest;
    use std::time::Duration;

    fn image(id: &str, name: &str, url: Option<&str>) -> ImageRecord {
        ImageRecord {
            node_id: id.to_string(),
            node_name: name.to_string(),
            page_name: "Home".to_string(),
            frame_name: Some("Hero".to_string()),
            path: format!("Hero → {name}"),
            image_url: url.map(str::to_string),
            archive_path: None,
        }
    }

    fn data(images: Vec<ImageRecord>) -> ExportData {
        ExportData {
            version: "42".to_string(),
            texts: vec![TextRecord {
                node_id: "1:1".to_string(),
                node_name: "Title".to_string(),
                page_name: "Home".to_string(),
                frame_name: Some("Hero".to_string()),
                path: "Hero → Title".to_string(),
                text: "Hello".to_string(),
            }],
            images,
        }
    }

    fn assembler(source: Arc<MockAssetSource>, settings: ArchiveSettings) -> ArchiveAssembler {
        let downloads = DownloadSettings { start_delay: Duration::ZERO, ..DownloadSettings::default() };
        let limiter = Arc::new(RateLimiter::new(10_000.0, 10_000).unwrap());
        let manager = AssetDownloadManager::new(source, limiter, downloads);
        ArchiveAssembler::new(manager, FormatterRegistry::default(), settings)
    }

    async fn run(assembler: &ArchiveAssembler, data: &ExportData, sink: MemorySink) -> Vec<Result<AssembleEvent>> {
        assembler.assemble(data, sink).collect().await
    }

    fn summary(events: &[Result<AssembleEvent>]) -> ArchiveSummary {
        match events.last() {
            Some(Ok(AssembleEvent::Complete(summary))) => summary.clone(),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_numbers_collisions_and_caps() {
        let data = data(vec![
            image("2:1", "Logo", Some("https://cdn/a.png")),
            image("2:1", "Logo", Some("https://cdn/b.png")),
            image("3:1", "Photo", None),
            image("4:1", "Extra", Some("https://cdn/c.png")),
        ]);
        let plan = plan(&data, 3);
        assert_eq!(plan.dropped, 1);
        let paths: Vec<_> = plan.tasks.iter().map(|task| task.path.as_str()).collect();
        assert_eq!(paths, ["Home/Hero/Logo_id_2_1.png", "Home/Hero/Logo_id_2_1_2.png", "Home/Hero/Photo_id_3_1.png"]);
        assert_eq!(plan.tasks[2].url, "");
        assert_eq!(plan.data.images[1].archive_path.as_deref(), Some("Home/Hero/Logo_id_2_1_2.png"));
        assert_eq!(plan.data.images[3].archive_path, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_metadata_index_then_assets() {
        let source = Arc::new(MockAssetSource::new().with_assets([
            ("https://cdn/a.png", b"aaa".to_vec()),
            ("https://cdn/b.png", b"bb".to_vec()),
        ]));
        let data = data(vec![
            image("2:1", "Logo", Some("https://cdn/a.png")),
            image("2:2", "Icon", Some("https://cdn/b.png")),
        ]);
        let sink = MemorySink::new();
        let events = run(&assembler(source, ArchiveSettings::default()), &data, sink.clone()).await;

        assert!(matches!(events[0], Ok(AssembleEvent::Started)));
        assert!(matches!(&events[1], Ok(AssembleEvent::MetadataWritten { name }) if name == "figma.json"));
        assert!(matches!(
            &events[2],
            Ok(AssembleEvent::IndexWritten { format, name }) if format == "csv" && name == "index.csv"
        ));
        assert!(matches!(events[3], Ok(AssembleEvent::DownloadsQueued(2))));
        let summary = summary(&events);
        assert_eq!(summary.images_written, 2);
        assert!(summary.warnings.is_empty());

        let names = sink.names();
        assert_eq!(&names[..2], ["figma.json", "index.csv"]);
        assert_eq!(sink.entry("Home/Hero/Logo_id_2_1.png").unwrap(), b"aaa");
        assert!(sink.is_finished());

        let metadata: ExportData = serde_json::from_slice(&sink.entry("figma.json").unwrap()).unwrap();
        assert_eq!(metadata.images[1].archive_path.as_deref(), Some("Home/Hero/Icon_id_2_2.png"));
        let index = String::from_utf8(sink.entry("index.csv").unwrap()).unwrap();
        assert!(index.contains("Home/Hero/Icon_id_2_2.png"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_asset_is_skipped_with_warning() {
        let source = Arc::new(MockAssetSource::new().with_assets([("https://cdn/a.png", b"aaa".to_vec())]));
        let data = data(vec![
            image("2:1", "Logo", Some("https://cdn/a.png")),
            image("2:2", "Gone", Some("https://cdn/404.png")),
        ]);
        let sink = MemorySink::new();
        let events = run(&assembler(source, ArchiveSettings::default()), &data, sink.clone()).await;

        let summary = summary(&events);
        assert_eq!((summary.images_written, summary.images_skipped), (1, 1));
        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("https://cdn/404.png"));
        let not_found = |e: &Result<AssembleEvent>| {
            matches!(e, Ok(AssembleEvent::AssetSkipped { reason: DownloadErrorKind::NotFound, .. }))
        };
        assert!(events.iter().any(not_found));
        assert_eq!(sink.entry("Home/Hero/Gone_id_2_2.png"), None);
        assert!(sink.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_urls_fetch_once_but_write_both() {
        let source = Arc::new(MockAssetSource::new().with_assets([("https://cdn/a.png", b"aaa".to_vec())]));
        let data = data(vec![
            image("2:1", "Logo", Some("https://cdn/a.png")),
            image("2:2", "Logo", Some("https://cdn/a.png")),
        ]);
        let sink = MemorySink::new();
        let events = run(&assembler(source.clone(), ArchiveSettings::default()), &data, sink.clone()).await;

        assert_eq!(summary(&events).images_written, 2);
        assert_eq!(source.fetches("https://cdn/a.png"), 1);
        assert!(sink.entry("Home/Hero/Logo_id_2_1.png").is_some());
        assert!(sink.entry("Home/Hero/Logo_id_2_2.png").is_some());
    }

    #[rstest]
    #[case(vec!["xlsx"], 0)]
    #[case(vec!["csv", "xlsx"], 1)]
    #[case(vec!["CSV", "jsonl"], 2)]
    #[tokio::test(start_paused = true)]
    async fn test_index_formats(#[case] formats: Vec<&str>, #[case] written: usize) {
        let index_formats = formats.iter().map(|f| f.to_string()).collect();
        let settings = ArchiveSettings { index_formats, ..ArchiveSettings::default() };
        let assembler = assembler(Arc::new(MockAssetSource::new()), settings);
        let events = run(&assembler, &data(vec![]), MemorySink::new()).await;

        let indexes = events.iter().filter(|e| matches!(e, Ok(AssembleEvent::IndexWritten { .. }))).count();
        let skipped = events.iter().filter(|e| matches!(e, Ok(AssembleEvent::IndexSkipped { .. }))).count();
        assert_eq!(indexes, written);
        assert_eq!(skipped, formats.len() - written);
        assert_eq!(summary(&events).warnings.len(), formats.len() - written);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_format_is_skipped_before_generating() {
        let settings = ArchiveSettings { index_formats: vec!["xlsx".to_string()], ..ArchiveSettings::default() };
        let sink = MemorySink::new();
        let events = run(&assembler(Arc::new(MockAssetSource::new()), settings), &data(vec![]), sink.clone()).await;

        assert!(matches!(
            &events[2],
            Ok(AssembleEvent::IndexSkipped { format, reason })
                if format == "xlsx" && reason == "unsupported index format: xlsx"
        ));
        assert_eq!(sink.names(), ["figma.json"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suffixed_and_natural_names_do_not_clash() {
        let source = Arc::new(MockAssetSource::new().with_assets([
            ("https://cdn/a.png", b"a".to_vec()),
            ("https://cdn/b.png", b"b".to_vec()),
            ("https://cdn/c.png", b"c".to_vec()),
        ]));
        let data = data(vec![
            image("1:2", "Logo", Some("https://cdn/a.png")),
            image("1:2", "Logo", Some("https://cdn/b.png")),
            image("1:2:2", "Logo", Some("https://cdn/c.png")),
        ]);
        let sink = MemorySink::new();
        let events = run(&assembler(source, ArchiveSettings::default()), &data, sink.clone()).await;

        assert_eq!(summary(&events).images_written, 3);
        assert_eq!(sink.entry("Home/Hero/Logo_id_1_2.png").unwrap(), b"a");
        assert_eq!(sink.entry("Home/Hero/Logo_id_1_2_2.png").unwrap(), b"b");
        assert_eq!(sink.entry("Home/Hero/Logo_id_1_2_2_2.png").unwrap(), b"c");
        assert!(sink.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_disabled() {
        let settings = ArchiveSettings { include_index: false, ..ArchiveSettings::default() };
        let sink = MemorySink::new();
        run(&assembler(Arc::new(MockAssetSource::new()), settings), &data(vec![]), sink.clone()).await;
        assert_eq!(sink.names(), ["figma.json"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_cap_drops_excess() {
        let source = Arc::new(
            MockAssetSource::new().with_assets((0..5).map(|n| (format!("https://cdn/{n}.png"), b"x".to_vec()))),
        );
        let images =
            (0..5).map(|n| image(&format!("2:{n}"), "Img", Some(format!("https://cdn/{n}.png").as_str()))).collect();
        let settings = ArchiveSettings { max_images: 3, ..ArchiveSettings::default() };
        let events = run(&assembler(source.clone(), settings), &data(images), MemorySink::new()).await;

        let summary = summary(&events);
        assert_eq!((summary.images_written, summary.images_dropped), (3, 2));
        assert_eq!(source.total_fetches(), 3);
        assert!(summary.warnings[0].contains("limit of 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_raises_archive_creation() {
        let sink = MemorySink::new().failing_on("figma.json");
        let assembler = assembler(Arc::new(MockAssetSource::new()), ArchiveSettings::default());
        let events = run(&assembler, &data(vec![]), sink.clone()).await;

        let Some(Err(err)) = events.last() else {
            panic!("expected the stream to end with an error");
        };
        assert!(matches!(
            &**err,
            ErrorKind::ArchiveCreation(reason) if reason == "failed to write archive entry: figma.json"
        ));
        assert!(!events.iter().any(|e| matches!(e, Ok(AssembleEvent::Complete(_)))));
        assert!(!sink.is_finished());
    }
}
