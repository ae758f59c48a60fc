//! Counters reported while archives are assembled.
//!
//! Every hook has an empty default so sinks only implement what they record.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub type MetricsHandle = Arc<dyn Metrics + Send + Sync>;

pub trait Metrics {
    fn image_downloaded(&self, _bytes: u64) {}

    fn image_skipped(&self) {}

    fn archive_succeeded(&self) {}

    fn archive_failed(&self) {}

    fn archive_duration(&self, _elapsed: Duration) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;
impl Metrics for NoopMetrics {}

/// Emits every measurement as a `tracing` event on the `figpack::metrics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;
impl Metrics for TracingMetrics {
    fn image_downloaded(&self, bytes: u64) {
        tracing::debug!(target: "figpack::metrics", bytes, "image downloaded");
    }

    fn image_skipped(&self) {
        tracing::debug!(target: "figpack::metrics", "image skipped");
    }

    fn archive_succeeded(&self) {
        tracing::info!(target: "figpack::metrics", "archive succeeded");
    }

    fn archive_failed(&self) {
        tracing::warn!(target: "figpack::metrics", "archive failed");
    }

    fn archive_duration(&self, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(target: "figpack::metrics", elapsed_ms, "archive duration");
    }
}

/// Point-in-time copy of [`CountingMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub images_downloaded: u64,
    pub bytes_downloaded: u64,
    pub images_skipped: u64,
    pub archives_succeeded: u64,
    pub archives_failed: u64,
    /// Sum of all reported archive durations.
    pub archive_time: Duration,
}

/// In-process counters, readable through [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct CountingMetrics {
    images_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    images_skipped: AtomicU64,
    archives_succeeded: AtomicU64,
    archives_failed: AtomicU64,
    archive_time_ms: AtomicU64,
}
impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            images_downloaded: self.images_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            images_skipped: self.images_skipped.load(Ordering::Relaxed),
            archives_succeeded: self.archives_succeeded.load(Ordering::Relaxed),
            archives_failed: self.archives_failed.load(Ordering::Relaxed),
            archive_time: Duration::from_millis(self.archive_time_ms.load(Ordering::Relaxed)),
        }
    }
}
impl Metrics for CountingMetrics {
    fn image_downloaded(&self, bytes: u64) {
        self.images_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    fn image_skipped(&self) {
        self.images_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn archive_succeeded(&self) {
        self.archives_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn archive_failed(&self) {
        self.archives_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn archive_duration(&self, elapsed: Duration) {
        let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.archive_time_ms.fetch_add(millis, Ordering::Relaxed);
    }
}
