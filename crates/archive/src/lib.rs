//! Archive assembly.
//!
//! [`ArchiveAssembler`] turns extracted [`ExportData`](figpack_extract::ExportData)
//! into a single container written through an [`OutputSink`]:
//!
//! 1. the extracted data as JSON metadata,
//! 2. one index per configured format, produced by an [`IndexFormatter`],
//! 3. every image asset, downloaded through
//!    [`AssetDownloadManager`](figpack_download::AssetDownloadManager) and
//!    placed under a path computed by [`EntryNamer`].
//!
//! Progress is reported as a stream of [`AssembleEvent`]s.

mod assemble;
pub mod error;
pub mod index;
mod metrics;
mod naming;
pub mod sink;

pub use crate::assemble::{ArchiveAssembler, ArchiveSettings, ArchiveSummary, AssembleEvent, Plan};
pub use crate::index::{FormatterRegistry, IndexFormatter};
pub use crate::metrics::{CountingMetrics, Metrics, MetricsHandle, MetricsSnapshot, NoopMetrics, TracingMetrics};
pub use crate::naming::{EntryNamer, sanitize};
pub use crate::sink::{OutputSink, ZipSink};
