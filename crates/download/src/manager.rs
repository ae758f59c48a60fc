use crate::error::ErrorKind;
use crate::source::AssetHandle;
use async_stream::stream;
use bytes::Bytes;
use dashmap::DashMap;
use figpack_cache::SingleFlightCache;
use figpack_remote::{RateLimiter, exponential};
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Tuning for [`AssetDownloadManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Downloads allowed in flight at once.
    pub max_concurrent: NonZeroUsize,
    /// Attempts per asset, including the first.
    pub max_attempts: u32,
    /// After failed attempt `n`, wait `backoff_unit * 2^n`.
    pub backoff_unit: Duration,
    /// Assets larger than this are abandoned without retrying.
    pub max_bytes: u64,
    /// Pause before each distinct asset's first request.
    pub start_delay: Duration,
}
impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::new(8).unwrap_or(NonZeroUsize::MIN),
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            max_bytes: 50 * 1024 * 1024,
            start_delay: Duration::from_millis(300),
        }
    }
}

/// One asset to fetch and where it will be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub path: String,
}
impl DownloadTask {
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self { url: url.into(), path: path.into() }
    }
}

/// Resolution of one [`DownloadTask`], emitted by
/// [`AssetDownloadManager::download`] in completion order.
///
/// `completed` counts resolved tasks so far: it starts at 1 and increases by
/// exactly one per event, whether the asset was fetched or skipped.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Fetched { task: DownloadTask, data: Bytes, completed: u64 },
    Skipped { task: DownloadTask, reason: ErrorKind, completed: u64 },
}
impl DownloadEvent {
    pub fn task(&self) -> &DownloadTask {
        match self {
            Self::Fetched { task, .. } | Self::Skipped { task, .. } => task,
        }
    }

    pub fn completed(&self) -> u64 {
        match self {
            Self::Fetched { completed, .. } | Self::Skipped { completed, .. } => *completed,
        }
    }
}

/// What became of a URL; memoised until every task sharing it has resolved.
#[derive(Debug, Clone)]
enum Outcome {
    Fetched(Bytes),
    Skipped(ErrorKind),
}

type Memo = SingleFlightCache<String, Outcome, ErrorKind>;

/// State shared by the tasks of one [`AssetDownloadManager::download`] call.
struct Run {
    gate: Arc<Semaphore>,
    memo: Memo,
    /// Unresolved tasks per URL. A memoised outcome is dropped along with the
    /// last task that needs it.
    remaining: DashMap<String, usize>,
}
impl Run {
    fn new(tasks: &[DownloadTask], max_concurrent: usize) -> Self {
        let remaining = DashMap::new();
        for task in tasks.iter().filter(|task| !task.url.trim().is_empty()) {
            *remaining.entry(task.url.clone()).or_insert(0) += 1;
        }
        Self { gate: Arc::new(Semaphore::new(max_concurrent)), memo: Memo::new(), remaining }
    }

    fn release(&self, url: &str) {
        let last = self.remaining.remove_if_mut(url, |_, left| {
            *left = left.saturating_sub(1);
            *left == 0
        });
        if last.is_some() {
            self.memo.evict(&url.to_string());
        }
    }
}

struct Fetcher {
    source: AssetHandle,
    limiter: Arc<RateLimiter>,
    settings: DownloadSettings,
}

impl Fetcher {
    async fn resolve(self: Arc<Self>, url: String, run: Arc<Run>) -> Outcome {
        if url.trim().is_empty() {
            return Outcome::Skipped(ErrorKind::MissingUrl);
        }
        let fetcher = self.clone();
        let gate = run.gate.clone();
        let key = url.clone();
        let outcome = run
            .memo
            .get_or_compute(url.clone(), move || async move {
                // Only the fetching task holds a slot, until its outcome is
                // known. Tasks sharing the URL wait without one.
                let Ok(_permit) = gate.acquire_owned().await else {
                    return Ok(Outcome::Skipped(ErrorKind::Network("download gate closed".to_string())));
                };
                Ok::<_, exn::Exn<ErrorKind>>(fetcher.fetch(&key).await)
            })
            .await;
        run.release(&url);
        match outcome {
            Ok(outcome) => (*outcome).clone(),
            Err(err) => Outcome::Skipped((*err).clone()),
        }
    }

    async fn fetch(&self, url: &str) -> Outcome {
        if !self.settings.start_delay.is_zero() {
            tokio::time::sleep(self.settings.start_delay).await;
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            let kind = match self.source.fetch(url, self.settings.max_bytes).await {
                Ok(data) if !data.is_empty() => {
                    tracing::debug!(url, attempt, bytes = data.len(), "Downloaded asset");
                    return Outcome::Fetched(data);
                },
                Ok(_) => ErrorKind::Empty,
                Err(err) => (*err).clone(),
            };
            if !kind.is_retryable() {
                tracing::warn!(url, attempt, error = %kind, "Asset can't be fetched, skipping");
                return Outcome::Skipped(kind);
            }
            if attempt >= self.settings.max_attempts {
                tracing::warn!(url, attempts = attempt, error = %kind, "Asset retries exhausted, skipping");
                return Outcome::Skipped(kind);
            }
            let delay = exponential(self.settings.backoff_unit, attempt);
            tracing::warn!(
                url,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %kind,
                "Asset fetch failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Fetches assets with bounded concurrency and per-URL coalescing.
///
/// - At most `max_concurrent` assets are fetched at a time. Admission is
///   first-come first-served, so one slow asset holds one slot and doesn't
///   stall the rest.
/// - Each distinct URL is fetched at most once per [`download`](Self::download)
///   call. Tasks sharing a URL wait for the first one's fetch, without taking
///   a slot, and reuse its outcome, success or failure. The outcome is
///   released once every task sharing the URL has resolved.
/// - Every attempt takes a token from the shared [`RateLimiter`].
/// - Rate limiting, size refusals, server and network errors are retried up to
///   `max_attempts` times; not-found, forbidden, other client errors and
///   oversized payloads are not. Either way the task is reported as
///   [`Skipped`](DownloadEvent::Skipped) and the run continues.
pub struct AssetDownloadManager {
    fetcher: Arc<Fetcher>,
}

impl AssetDownloadManager {
    pub fn new(source: AssetHandle, limiter: Arc<RateLimiter>, settings: DownloadSettings) -> Self {
        Self { fetcher: Arc::new(Fetcher { source, limiter, settings }) }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.fetcher.settings
    }

    /// Download every task, yielding one [`DownloadEvent`] per task as it
    /// resolves.
    ///
    /// Work is spawned onto the tokio runtime when the stream is first
    /// polled. Dropping the stream early stops reporting but lets downloads
    /// already admitted run to completion.
    pub fn download(&self, tasks: Vec<DownloadTask>) -> impl Stream<Item = DownloadEvent> + Send + 'static {
        let fetcher = self.fetcher.clone();
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let run = Arc::new(Run::new(&tasks, fetcher.settings.max_concurrent.get()));
            tracing::info!(
                tasks = tasks.len(),
                max_concurrent = fetcher.settings.max_concurrent.get(),
                source = fetcher.source.name(),
                "Starting asset downloads"
            );

            let mut pending = FuturesUnordered::new();
            for task in tasks {
                let handle = tokio::spawn(fetcher.clone().resolve(task.url.clone(), run.clone()));
                pending.push(async move { (task, handle.await) });
            }

            let mut completed = 0;
            while let Some((task, joined)) = pending.next().await {
                completed += 1;
                let outcome = joined.unwrap_or_else(|err| {
                    tracing::error!(url = %task.url, error = %err, "Download task failed to complete");
                    Outcome::Skipped(ErrorKind::Network(err.to_string()))
                });
                yield match outcome {
                    Outcome::Fetched(data) => DownloadEvent::Fetched { task, data, completed },
                    Outcome::Skipped(reason) => DownloadEvent::Skipped { task, reason, completed },
                };
            }
        })
    }
}
