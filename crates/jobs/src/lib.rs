//! Export jobs.
//!
//! An export runs in two stages, both observable through the
//! [`ProgressTracker`]:
//!
//! 1. **Export**: fetch the document (through a single-flight cache keyed by
//!    file key) or an explicit node selection, and extract its records. The
//!    task ends up `READY` with the [`ExportData`](figpack_extract::ExportData)
//!    attached as its result.
//! 2. **Archive**: stream the result into an output sink, downloading images
//!    as it goes. The task ends up `COMPLETED`, or `ERROR` with a diagnostic.
//!
//! Terminal tasks are purged after a grace period so late polls still see
//! how they ended. Nothing survives a restart.

pub mod error;
mod exporter;
mod tracker;

pub use crate::exporter::{DocumentCache, ExportRequest, Exporter, NodeSelection};
pub use crate::tracker::{DEFAULT_REMOVAL_GRACE, JobProgress, JobStatus, ProgressTracker, TaskId};
