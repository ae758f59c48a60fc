use crate::exporter::ExportRequest;
use dashmap::DashMap;
use derive_more::Display;
use figpack_extract::ExportData;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How long a finished task stays visible before it is purged.
pub const DEFAULT_REMOVAL_GRACE: Duration = Duration::from_secs(300);

/// Identifies one export task.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);
impl TaskId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum JobStatus {
    #[display("PENDING")]
    Pending,
    #[display("EXPORTING")]
    Exporting,
    /// Records extracted; the archive can be streamed.
    #[display("READY")]
    Ready,
    #[display("DOWNLOADING")]
    Downloading,
    #[display("COMPLETED")]
    Completed,
    #[display("ERROR: {_0}")]
    Error(String),
    /// Reported for identifiers the tracker doesn't know (or no longer knows).
    #[display("NOT_FOUND")]
    NotFound,
}
impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error(_))
    }
}

/// Snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub current: u64,
    pub total: u64,
    pub status: JobStatus,
}
impl JobProgress {
    pub fn new(current: u64, total: u64, status: JobStatus) -> Self {
        Self { current, total, status }
    }

    fn not_found() -> Self {
        Self::new(0, 0, JobStatus::NotFound)
    }
}

struct Task {
    progress: JobProgress,
    result: Option<Arc<ExportData>>,
    settings: Option<ExportRequest>,
}

/// In-memory table of export tasks.
///
/// Clones share the same table. Updates to one task never wait on another:
/// each entry is locked independently and never across an `.await`.
#[derive(Clone)]
pub struct ProgressTracker {
    tasks: Arc<DashMap<TaskId, Task>>,
    grace: Duration,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self { tasks: Arc::new(DashMap::new()), grace: DEFAULT_REMOVAL_GRACE }
    }

    /// Keep terminal tasks for `grace` instead of [`DEFAULT_REMOVAL_GRACE`].
    pub fn with_removal_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Register a new task in the `PENDING` state.
    pub fn create_task(&self) -> TaskId {
        let id = TaskId::generate();
        let progress = JobProgress::new(0, 0, JobStatus::Pending);
        self.tasks.insert(id, Task { progress, result: None, settings: None });
        tracing::debug!(task = %id, "Created task");
        id
    }

    /// Overwrite a task's counts and status together. Unknown tasks are
    /// ignored.
    pub fn update_progress(&self, id: &TaskId, current: u64, total: u64, status: JobStatus) {
        match self.tasks.get_mut(id) {
            Some(mut task) => task.progress = JobProgress::new(current, total, status),
            None => tracing::debug!(task = %id, %status, "Progress update for unknown task ignored"),
        }
    }

    /// The task's progress, or a `NOT_FOUND` snapshot.
    pub fn get_progress(&self, id: &TaskId) -> JobProgress {
        self.tasks.get(id).map(|task| task.progress.clone()).unwrap_or_else(JobProgress::not_found)
    }

    pub fn set_result(&self, id: &TaskId, result: Arc<ExportData>) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            task.result = Some(result);
        }
    }

    pub fn get_result(&self, id: &TaskId) -> Option<Arc<ExportData>> {
        self.tasks.get(id).and_then(|task| task.result.clone())
    }

    pub fn set_settings(&self, id: &TaskId, settings: ExportRequest) {
        if let Some(mut task) = self.tasks.get_mut(id) {
            task.settings = Some(settings);
        }
    }

    pub fn get_settings(&self, id: &TaskId) -> Option<ExportRequest> {
        self.tasks.get(id).and_then(|task| task.settings.clone())
    }

    pub fn remove_task(&self, id: &TaskId) {
        if self.tasks.remove(id).is_some() {
            tracing::debug!(task = %id, "Removed task");
        }
    }

    /// Purge the task once the removal grace period has passed.
    pub fn remove_after_grace(&self, id: &TaskId) {
        let tracker = self.clone();
        let id = *id;
        tokio::spawn(async move {
            tokio::time::sleep(tracker.grace).await;
            tracker.remove_task(&id);
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
