use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figpack_archive::{ArchiveAssembler, FormatterRegistry, TracingMetrics, ZipSink};
use figpack_config::Settings;
use figpack_download::{AssetDownloadManager, HttpAssetSource};
use figpack_jobs::{DocumentCache, ExportRequest, Exporter, ProgressTracker};
use figpack_remote::{HttpSource, RemoteFetchClient};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

/// Wire every component from `settings`.
fn exporter(settings: &Settings) -> Result<Exporter> {
    let token = settings.api.token.clone().ok_or_raise(|| ErrorKind::MissingToken)?;
    let limiter = Arc::new(settings.rate_limit.limiter().or_raise(|| ErrorKind::Config)?);

    let source = HttpSource::new(&settings.api.base_url, token, settings.api.timeout())
        .or_raise(|| ErrorKind::Setup("remote source"))?;
    let fetch = settings.fetch.settings().or_raise(|| ErrorKind::Config)?;
    let client = RemoteFetchClient::new(Arc::new(source), limiter.clone(), fetch);

    let assets = HttpAssetSource::new(settings.download.timeout()).or_raise(|| ErrorKind::Setup("asset source"))?;
    let downloads = settings.download.settings().or_raise(|| ErrorKind::Config)?;
    let downloads = AssetDownloadManager::new(Arc::new(assets), limiter, downloads);

    let metrics = Arc::new(TracingMetrics);
    let assembler = ArchiveAssembler::new(downloads, FormatterRegistry::default(), settings.archive.settings())
        .with_metrics(metrics.clone());
    let documents = DocumentCache::new()
        .with_ttl(settings.cache.ttl())
        .with_capacity(settings.cache.capacity().or_raise(|| ErrorKind::Config)?);
    let tracker = ProgressTracker::new().with_removal_grace(settings.jobs.removal_grace());

    Ok(Exporter::new(client, assembler, tracker).with_document_cache(documents).with_metrics(metrics))
}

/// Export `request` into a new ZIP archive at `output`. The archive is
/// removed again if the export doesn't complete.
pub async fn export(settings: &Settings, request: ExportRequest, output: &Path) -> Result<()> {
    let exporter = exporter(settings)?;
    let file = File::create(output).or_raise(|| ErrorKind::Output(output.display().to_string()))?;
    let sink = ZipSink::new(BufWriter::new(file));

    let outcome = tokio::select! {
        outcome = exporter.run(request, sink) => outcome.or_raise(|| ErrorKind::Export),
        _ = tokio::signal::ctrl_c() => Err(exn::Exn::from(ErrorKind::Interrupted)),
    };
    let (task, summary) = match outcome {
        Ok(finished) => finished,
        Err(err) => {
            if let Err(cleanup) = std::fs::remove_file(output) {
                tracing::warn!(path = %output.display(), error = %cleanup, "Failed to remove incomplete archive");
            }
            return Err(err);
        },
    };

    tracing::info!(%task, path = %output.display(), "Archive written");
    println!(
        "{}: {} entries, {} images written, {} skipped, {} over the limit",
        output.display(),
        summary.entries.len(),
        summary.images_written,
        summary.images_skipped,
        summary.images_dropped,
    );
    for warning in &summary.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

/// Print the records `request` would export.
pub async fn inspect(settings: &Settings, request: ExportRequest, json: bool) -> Result<()> {
    let exporter = exporter(settings)?;
    let data = exporter.export(&request).await.or_raise(|| ErrorKind::Export)?;
    if json {
        let rendered = serde_json::to_string_pretty(&data).or_raise(|| ErrorKind::Output("stdout".to_string()))?;
        println!("{rendered}");
        return Ok(());
    }
    let texts = data.texts.iter().map(|text| text.page_name.as_str());
    let pages: BTreeSet<&str> = texts.chain(data.images.iter().map(|image| image.page_name.as_str())).collect();
    println!("{} (version {})", request.file_key, data.version);
    println!("  pages with content: {}", pages.len());
    println!("  text records:       {}", data.texts.len());
    println!("  image records:      {}", data.images.len());
    let missing = data.images.iter().filter(|image| image.image_url.is_none()).count();
    if missing > 0 {
        println!("  images without URL: {missing}");
    }
    Ok(())
}
