//! FIFO scan job queue with the subtree overlap rule.
//!
//! A job may not start while a running job targets the same directory, an
//! ancestor or a descendant. Eligibility scans front to back and a job that
//! overlaps an earlier queued job is held too, so overlapping jobs keep
//! submission order while disjoint ones bypass.

mod job;

pub use job::{DispatchedJob, JobHandle, JobInfo, ScanJob};

use chrono::Utc;
use omniscan_common::paths::subtrees_overlap;
use omniscan_common::{Error, JobId, JobStatus, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;

/// Finished jobs kept for the jobs listing.
const MAX_FINISHED: usize = 100;

struct Entry {
    job: ScanJob,
    status_tx: watch::Sender<JobStatus>,
    cancel: CancellationToken,
}

impl Entry {
    fn set_status(&mut self, status: JobStatus) {
        self.job.status = status;
        if status.is_terminal() {
            self.job.finished_at = Some(Utc::now());
        }
        self.status_tx.send_replace(status);
    }
}

struct Inner {
    pending: VecDeque<Entry>,
    running: HashMap<JobId, Entry>,
    finished: VecDeque<JobInfo>,
    max_workers: usize,
}

impl Inner {
    fn retire(&mut self, mut entry: Entry, status: JobStatus) {
        entry.set_status(status);
        self.finished.push_front(entry.job.info());
        self.finished.truncate(MAX_FINISHED);
    }
}

pub struct JobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    /// Parent of every job token; cancelled on shutdown
    root_token: CancellationToken,
}

impl JobQueue {
    pub fn new(max_workers: usize, root_token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                pending: VecDeque::new(),
                running: HashMap::new(),
                finished: VecDeque::new(),
                max_workers: max_workers.max(1),
            }),
            notify: Notify::new(),
            root_token,
        })
    }

    /// Enqueue a job.
    pub fn submit(self: &Arc<Self>, mut job: ScanJob) -> JobHandle {
        job.status = JobStatus::Queued;
        let (status_tx, status_rx) = watch::channel(JobStatus::Queued);
        let cancel = self.root_token.child_token();
        let handle = JobHandle::new(&job, status_rx, cancel.clone(), Arc::clone(self));

        tracing::debug!(
            job_id = %job.id,
            target = %job.target.display(),
            reason = %job.reason,
            "scan job queued"
        );

        self.inner.lock().pending.push_back(Entry {
            job,
            status_tx,
            cancel,
        });
        self.notify.notify_one();
        handle
    }

    /// Wait until a job is eligible and a worker slot is free.
    pub async fn dispatch(&self) -> DispatchedJob {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.try_dispatch() {
                return job;
            }
            notified.await;
        }
    }

    /// Non-blocking dispatch attempt.
    pub fn try_dispatch(&self) -> Option<DispatchedJob> {
        let mut inner = self.inner.lock();

        // Queued jobs whose token fired through a handle or shutdown
        while let Some(idx) = inner.pending.iter().position(|e| e.cancel.is_cancelled()) {
            if let Some(entry) = inner.pending.remove(idx) {
                inner.retire(entry, JobStatus::Cancelled);
            }
        }

        if inner.running.len() >= inner.max_workers {
            return None;
        }

        let mut held: Vec<&Path> = Vec::new();
        let mut chosen = None;
        for (idx, entry) in inner.pending.iter().enumerate() {
            let target = entry.job.target.as_path();
            let blocked = inner
                .running
                .values()
                .any(|r| subtrees_overlap(&r.job.target, target))
                || held.iter().any(|h| subtrees_overlap(h, target));
            if blocked {
                held.push(target);
                continue;
            }
            chosen = Some(idx);
            break;
        }

        let mut entry = inner.pending.remove(chosen?)?;
        entry.job.started_at = Some(Utc::now());
        entry.set_status(JobStatus::Running);

        let dispatched = DispatchedJob {
            job: entry.job.clone(),
            cancel: entry.cancel.clone(),
        };
        inner.running.insert(entry.job.id, entry);
        Some(dispatched)
    }

    /// Release a running job with its terminal status.
    pub fn finish(&self, id: JobId, status: JobStatus) {
        {
            let mut inner = self.inner.lock();
            match inner.running.remove(&id) {
                Some(entry) => inner.retire(entry, status),
                None => {
                    tracing::warn!(job_id = %id, "finish called for a job that is not running");
                    return;
                }
            }
        }
        self.notify.notify_one();
    }

    /// Cancel a job. Queued jobs are removed immediately; running jobs have
    /// their token fired and report `cancelled` when the worker finishes.
    pub fn cancel(&self, id: JobId) -> Result<JobStatus> {
        let status = {
            let mut inner = self.inner.lock();
            if let Some(idx) = inner.pending.iter().position(|e| e.job.id == id) {
                if let Some(entry) = inner.pending.remove(idx) {
                    entry.cancel.cancel();
                    inner.retire(entry, JobStatus::Cancelled);
                }
                JobStatus::Cancelled
            } else if let Some(entry) = inner.running.get(&id) {
                entry.cancel.cancel();
                JobStatus::Running
            } else if let Some(done) = inner.finished.iter().find(|j| j.id == id) {
                done.status
            } else {
                return Err(Error::not_found(format!("job {}", id)));
            }
        };
        tracing::info!(job_id = %id, %status, "scan job cancel requested");
        self.notify.notify_one();
        Ok(status)
    }

    /// Cancel every queued or running job targeting `dir` or below it.
    pub fn cancel_under(&self, dir: &Path) -> usize {
        let ids: Vec<JobId> = {
            let inner = self.inner.lock();
            inner
                .pending
                .iter()
                .chain(inner.running.values())
                .filter(|e| e.job.target.starts_with(dir))
                .map(|e| e.job.id)
                .collect()
        };
        ids.iter().filter(|id| self.cancel(**id).is_ok()).count()
    }

    /// Running jobs, then queued jobs in order, then recently finished ones.
    pub fn snapshot(&self) -> Vec<JobInfo> {
        let inner = self.inner.lock();
        let mut running: Vec<JobInfo> = inner.running.values().map(|e| e.job.info()).collect();
        running.sort_by_key(|j| j.started_at);
        running
            .into_iter()
            .chain(inner.pending.iter().map(|e| e.job.info()))
            .chain(inner.finished.iter().cloned())
            .collect()
    }

    pub fn set_max_workers(&self, n: usize) {
        self.inner.lock().max_workers = n.max(1);
        self.notify.notify_one();
    }

    pub fn running_targets(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .running
            .values()
            .map(|e| e.job.target.clone())
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner.lock().running.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Drop every queued job as cancelled. Running jobs are cancelled through
    /// the root token.
    pub fn drain_pending(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut drained = 0;
        while let Some(entry) = inner.pending.pop_front() {
            entry.cancel.cancel();
            inner.retire(entry, JobStatus::Cancelled);
            drained += 1;
        }
        drained
    }
}
