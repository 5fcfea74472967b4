//! Scan jobs and the handles callers hold on to them.

use chrono::{DateTime, Utc};
use omniscan_common::{JobId, JobStatus, TriggerReason};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::JobQueue;

/// One unit of directory verification work.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: JobId,
    pub target: PathBuf,
    pub root: PathBuf,
    pub recursive: bool,
    pub reason: TriggerReason,
    /// Relative paths that triggered the job, in arrival order
    pub hint_paths: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

impl ScanJob {
    pub fn new(
        target: PathBuf,
        root: PathBuf,
        recursive: bool,
        reason: TriggerReason,
        hint_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            id: JobId::new(),
            target,
            root,
            recursive,
            reason,
            hint_paths,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status: JobStatus::Queued,
        }
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            target: self.target.clone(),
            root: self.root.clone(),
            recursive: self.recursive,
            reason: self.reason,
            hint_count: self.hint_paths.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status,
        }
    }
}

/// Serializable view of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub target: PathBuf,
    pub root: PathBuf,
    pub recursive: bool,
    pub reason: TriggerReason,
    pub hint_count: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
}

/// A job handed out by [`JobQueue::dispatch`].
#[derive(Debug)]
pub struct DispatchedJob {
    pub job: ScanJob,
    pub cancel: CancellationToken,
}

/// Caller-side view of a submitted job.
#[derive(Clone)]
pub struct JobHandle {
    pub id: JobId,
    pub target: PathBuf,
    status: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
    queue: Arc<JobQueue>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("status", &self.status())
            .finish()
    }
}

impl JobHandle {
    pub(crate) fn new(
        job: &ScanJob,
        status: watch::Receiver<JobStatus>,
        cancel: CancellationToken,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            id: job.id,
            target: job.target.clone(),
            status,
            cancel,
            queue,
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Token fired when the job is cancelled or the service shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the job: a queued job is removed, a running one stops
    /// dispatching new files.
    pub fn cancel(&self) {
        let _ = self.queue.cancel(self.id);
    }

    /// Wait until the job reaches a terminal status.
    pub async fn wait(&self) -> JobStatus {
        let mut rx = self.status.clone();
        loop {
            let status = *rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}
