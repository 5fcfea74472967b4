//! Debounce coalescer.
//!
//! A single control loop owns every pending bucket. New events, manual scans,
//! cancellations and timer expiry are all handled in that loop, so a bucket is
//! never touched concurrently and a manual scan can never race its timer.

mod bucket;

pub use bucket::{BucketInfo, PendingBucket};

use omniscan_common::{Error, Result, TriggerReason};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics;
use crate::normalize::CanonicalPath;
use crate::queue::{JobHandle, JobQueue, ScanJob};

/// A normalized change, already keyed to the directory it should scan.
#[derive(Debug, Clone)]
pub struct CoalesceEvent {
    pub directory: PathBuf,
    pub root: PathBuf,
    pub recursive: bool,
    pub relative: PathBuf,
    pub reason: TriggerReason,
}

enum Msg {
    Event(CoalesceEvent),
    ScanNow {
        directory: PathBuf,
        root: PathBuf,
        recursive: bool,
        reason: TriggerReason,
        reply: oneshot::Sender<JobHandle>,
    },
    Cancel {
        directory: PathBuf,
    },
    CancelUnder {
        directory: PathBuf,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<BucketInfo>>,
    },
    SetDebounce(Duration),
}

/// Directory a change is grouped under.
///
/// An existing directory, or a deleted path the ledger knows as a directory,
/// is its own key; anything else groups under its parent. `rollup_depth`
/// lifts the key to the ancestor that many components below the root, never
/// deeper than that and never above the root.
pub fn directory_key(
    path: &CanonicalPath,
    is_dir: bool,
    known_dir: bool,
    rollup_depth: Option<usize>,
) -> PathBuf {
    let base = if is_dir || known_dir || path.path == path.root {
        path.path.clone()
    } else {
        match path.path.parent() {
            Some(parent) if parent.starts_with(&path.root) => parent.to_path_buf(),
            _ => path.root.clone(),
        }
    };

    let Some(depth) = rollup_depth else {
        return base;
    };
    let Ok(relative) = base.strip_prefix(&path.root) else {
        return base;
    };
    if relative.components().count() <= depth {
        return base;
    }
    let mut key = path.root.clone();
    key.extend(relative.components().take(depth));
    key
}

/// Handle to the coalescer control loop.
#[derive(Clone)]
pub struct Coalescer {
    tx: mpsc::UnboundedSender<Msg>,
}

impl Coalescer {
    /// Spawn the control loop. It stops when `shutdown` fires.
    pub fn spawn(
        queue: Arc<JobQueue>,
        debounce: Duration,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = ControlLoop {
            rx,
            buckets: HashMap::new(),
            debounce,
            queue,
            shutdown,
        };
        let handle = tokio::spawn(control.run());
        (Self { tx }, handle)
    }

    fn send(&self, msg: Msg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::internal("coalescer is not running"))
    }

    pub fn push(&self, event: CoalesceEvent) -> Result<()> {
        self.send(Msg::Event(event))
    }

    /// Cancel any pending bucket for `directory` and submit a job for it now.
    pub async fn scan_now(
        &self,
        directory: PathBuf,
        root: PathBuf,
        recursive: bool,
        reason: TriggerReason,
    ) -> Result<JobHandle> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::ScanNow {
            directory,
            root,
            recursive,
            reason,
            reply,
        })?;
        rx.await
            .map_err(|_| Error::internal("coalescer stopped before submitting the job"))
    }

    pub fn cancel(&self, directory: PathBuf) -> Result<()> {
        self.send(Msg::Cancel { directory })
    }

    /// Drop every bucket at or below `directory`.
    pub fn cancel_under(&self, directory: PathBuf) -> Result<()> {
        self.send(Msg::CancelUnder { directory })
    }

    pub async fn snapshot(&self) -> Result<Vec<BucketInfo>> {
        let (reply, rx) = oneshot::channel();
        self.send(Msg::Snapshot { reply })?;
        rx.await
            .map_err(|_| Error::internal("coalescer stopped before replying"))
    }

    /// Applies to events arriving after the change.
    pub fn set_debounce(&self, debounce: Duration) -> Result<()> {
        self.send(Msg::SetDebounce(debounce))
    }
}

struct ControlLoop {
    rx: mpsc::UnboundedReceiver<Msg>,
    buckets: HashMap<PathBuf, PendingBucket>,
    debounce: Duration,
    queue: Arc<JobQueue>,
    shutdown: CancellationToken,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ControlLoop {
    async fn run(mut self) {
        tracing::debug!(debounce_ms = self.debounce.as_millis() as u64, "coalescer started");
        loop {
            // A steady stream of messages must not hold back settled buckets
            self.fire_due(Instant::now());
            metrics::set_pending_scans(self.buckets.len());
            let next_deadline = self.buckets.values().map(|b| b.deadline).min();

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,
                _ = sleep_until(next_deadline) => self.fire_due(Instant::now()),
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break,
                },
            }
        }

        if !self.buckets.is_empty() {
            tracing::info!(
                count = self.buckets.len(),
                "coalescer stopping, dropping pending buckets"
            );
        }
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Event(event) => self.record(event),
            Msg::ScanNow {
                directory,
                root,
                recursive,
                reason,
                reply,
            } => {
                if let Some(bucket) = self.buckets.remove(&directory) {
                    tracing::info!(
                        directory = %directory.display(),
                        pending = bucket.changed().len(),
                        %reason,
                        "immediate scan cancels pending bucket"
                    );
                }
                let job = ScanJob::new(directory, root, recursive, reason, vec![]);
                let handle = self.queue.submit(job);
                if reply.send(handle).is_err() {
                    tracing::debug!("scan requester went away");
                }
            }
            Msg::Cancel { directory } => {
                if self.buckets.remove(&directory).is_some() {
                    tracing::debug!(directory = %directory.display(), "pending bucket cancelled");
                }
            }
            Msg::CancelUnder { directory } => self.cancel_under(&directory),
            Msg::Snapshot { reply } => {
                let now = Instant::now();
                let mut infos: Vec<BucketInfo> =
                    self.buckets.values().map(|b| b.info(now)).collect();
                infos.sort_by(|a, b| a.directory.cmp(&b.directory));
                let _ = reply.send(infos);
            }
            Msg::SetDebounce(debounce) => {
                tracing::info!(debounce_ms = debounce.as_millis() as u64, "debounce updated");
                self.debounce = debounce;
            }
        }
    }

    fn record(&mut self, event: CoalesceEvent) {
        let now = Instant::now();
        let debounce = self.debounce;
        let bucket = self
            .buckets
            .entry(event.directory.clone())
            .or_insert_with(|| {
                tracing::debug!(directory = %event.directory.display(), "new pending bucket");
                PendingBucket::new(
                    event.directory.clone(),
                    event.root.clone(),
                    event.recursive,
                    event.reason,
                    now,
                    debounce,
                )
            });
        bucket.record(event.relative, now, debounce);
    }

    fn cancel_under(&mut self, directory: &Path) {
        let before = self.buckets.len();
        self.buckets.retain(|key, _| !key.starts_with(directory));
        let dropped = before - self.buckets.len();
        if dropped > 0 {
            tracing::info!(
                directory = %directory.display(),
                dropped,
                "pending buckets cancelled"
            );
        }
    }

    fn fire_due(&mut self, now: Instant) {
        let due: Vec<PathBuf> = self
            .buckets
            .iter()
            .filter(|(_, b)| b.deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();

        for key in due {
            let Some(bucket) = self.buckets.remove(&key) else {
                continue;
            };
            tracing::info!(
                directory = %bucket.directory.display(),
                events = bucket.event_count,
                paths = bucket.changed().len(),
                "directory settled, submitting scan"
            );
            let directory = bucket.directory.clone();
            let root = bucket.root.clone();
            let recursive = bucket.recursive;
            let reason = bucket.reason;
            let job = ScanJob::new(directory, root, recursive, reason, bucket.into_changed());
            self.queue.submit(job);
        }
    }
}
