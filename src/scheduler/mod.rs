//! The scheduler facade.
//!
//! Owns the normalizer, coalescer, job queue, verifier, ledger and reporter
//! for the lifetime of the service. Built once at startup and shared as an
//! `Arc` with the watcher, the HTTP server and the CLI.

pub mod periodic;

use anyhow::Context;
use futures::Stream;
use omniscan_common::paths::has_extension;
use omniscan_common::{
    Error, EventKind, EventSource, FileRecord, JobId, JobStatus, Result, ScanSessionSummary,
    TriggerReason,
};
use omniscan_db::pool::DbPool;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::coalesce::{directory_key, BucketInfo, CoalesceEvent, Coalescer};
use crate::config::{self, persist, Config, RootConfig};
use crate::ledger::{HealthCounts, HealthFilter, HealthLedger};
use crate::metrics;
use crate::normalize::{CanonicalPath, PathNormalizer, WatchedRoot};
use crate::notifications::NotificationManager;
use crate::queue::{DispatchedJob, JobHandle, JobInfo, JobQueue};
use crate::report::{summarize, Baseline, Reporter};
use crate::state::{AppEvent, AppState};
use crate::verify::{default_prober, Prober, Verifier, VerifySettings};

/// Optional collaborators for [`Scheduler::start`].
#[derive(Default)]
pub struct SchedulerOptions {
    /// Store for records and summaries; in-memory only when `None`
    pub db: Option<DbPool>,
    /// Defaults to the built-in prober with ffprobe fallback
    pub prober: Option<Arc<dyn Prober>>,
    /// Defaults to the media servers and notifiers in the config
    pub notifications: Option<Arc<NotificationManager>>,
    /// File that root and scan updates are written back to
    pub config_path: Option<PathBuf>,
}

/// Paths of one [`Scheduler::ingest_batch`] call, split by outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestBatch {
    pub accepted: Vec<String>,
    pub ignored: Vec<String>,
}

/// Everything a running job needs.
struct JobContext {
    ledger: Arc<HealthLedger>,
    queue: Arc<JobQueue>,
    verifier: Arc<Verifier>,
    reporter: Arc<Reporter>,
    state: Arc<AppState>,
}

pub struct Scheduler {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    normalizer: RwLock<Arc<PathNormalizer>>,
    coalescer: Coalescer,
    notifications: Arc<NotificationManager>,
    ctx: Arc<JobContext>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Build every component, restore persisted state and start the
    /// coalescer and dispatcher tasks.
    pub fn start(config: Config, opts: SchedulerOptions) -> anyhow::Result<Arc<Self>> {
        let normalizer = PathNormalizer::new(&config.roots).context("Invalid watched roots")?;
        for root in normalizer.roots() {
            tracing::info!(
                root = %root.path.display(),
                recursive = root.recursive,
                "watching root"
            );
        }

        metrics::set_watched_directories(normalizer.roots().len());

        let state = AppState::new(config.storage.history_limit, opts.db);
        let ledger = Arc::new(HealthLedger::new());
        match state.restore(&ledger) {
            Ok((0, 0)) => {}
            Ok((records, sessions)) => {
                tracing::info!(records, sessions, "restored ledger and history from database")
            }
            Err(e) => tracing::warn!("Failed to restore persisted state: {:#}", e),
        }

        let notifications = opts
            .notifications
            .unwrap_or_else(|| Arc::new(NotificationManager::new(&config)));
        let prober = opts
            .prober
            .unwrap_or_else(|| Arc::new(default_prober(config.scan.probe_timeout())));

        let settings =
            VerifySettings::from_config(&config.scan).context("Invalid scan configuration")?;
        let verifier = Arc::new(Verifier::new(
            Arc::clone(&ledger),
            Arc::clone(&state),
            prober,
            settings,
        ));
        let reporter = Arc::new(Reporter::new(
            Arc::clone(&state),
            Arc::clone(&notifications),
            &config.scan,
        ));

        let shutdown = CancellationToken::new();
        let queue = JobQueue::new(config.scan.max_workers, shutdown.child_token());
        let (coalescer, coalescer_task) = Coalescer::spawn(
            Arc::clone(&queue),
            config.scan.debounce(),
            shutdown.child_token(),
        );

        let ctx = Arc::new(JobContext {
            ledger,
            queue,
            verifier,
            reporter,
            state,
        });
        let dispatcher_task = tokio::spawn(dispatch_loop(Arc::clone(&ctx), shutdown.clone()));

        Ok(Arc::new(Self {
            config: RwLock::new(config),
            config_path: opts.config_path,
            normalizer: RwLock::new(Arc::new(normalizer)),
            coalescer,
            notifications,
            ctx,
            shutdown,
            tasks: Mutex::new(vec![coalescer_task, dispatcher_task]),
        }))
    }

    fn normalizer(&self) -> Arc<PathNormalizer> {
        Arc::clone(&self.normalizer.read())
    }

    /// Accept a raw change notification.
    ///
    /// Returns as soon as the event is handed to the coalescer. Normalization
    /// errors go back to the caller; ignored, hidden and non-media paths are
    /// dropped with `Ok(())`.
    ///
    /// Blocking: normalization and directory detection stat the filesystem.
    /// The watcher calls this from its own thread; async callers go through
    /// `spawn_blocking`.
    pub fn ingest_event(&self, raw_path: &str, source: EventSource, kind: EventKind) -> Result<()> {
        let normalizer = self.normalizer();
        let canonical = normalizer.normalize(raw_path, source)?;
        self.ingest_canonical(&normalizer, canonical, source, kind)
    }

    /// Accept every path of one request, or none of them.
    ///
    /// All paths are normalized before any reaches the coalescer, so an
    /// invalid path rejects the whole batch. Out-of-scope paths are reported
    /// back as ignored. Blocking, like [`Scheduler::ingest_event`].
    pub fn ingest_batch(
        &self,
        raw_paths: &[String],
        source: EventSource,
        kind: EventKind,
    ) -> Result<IngestBatch> {
        let normalizer = self.normalizer();
        let mut resolved = Vec::with_capacity(raw_paths.len());
        let mut batch = IngestBatch::default();

        for raw in raw_paths {
            match normalizer.normalize(raw, source) {
                Ok(canonical) => resolved.push((raw, canonical)),
                Err(Error::OutOfScope(_)) => {
                    tracing::debug!(path = %raw, "path outside watched roots");
                    batch.ignored.push(raw.clone());
                }
                Err(e) => return Err(e),
            }
        }

        for (raw, canonical) in resolved {
            self.ingest_canonical(&normalizer, canonical, source, kind)?;
            batch.accepted.push(raw.clone());
        }
        Ok(batch)
    }

    fn ingest_canonical(
        &self,
        normalizer: &PathNormalizer,
        canonical: CanonicalPath,
        source: EventSource,
        kind: EventKind,
    ) -> Result<()> {
        let root = normalizer
            .roots()
            .iter()
            .find(|r| r.path == canonical.root)
            .ok_or_else(|| Error::OutOfScope(canonical.path.clone()))?;

        let settings = self.ctx.verifier.settings();
        let hidden = canonical
            .relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
        if hidden || settings.ignore.is_ignored(&canonical.path) {
            tracing::trace!(path = %canonical.path.display(), "ignored path, event dropped");
            return Ok(());
        }

        let is_dir = std::fs::metadata(&canonical.path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let known_dir = !is_dir && self.ctx.ledger.has_descendants(&canonical.path);
        if !is_dir
            && !known_dir
            && !has_extension(&canonical.path, &settings.extensions)
            && self.ctx.ledger.get(&canonical.path).is_none()
        {
            tracing::trace!(path = %canonical.path.display(), "non-media path, event dropped");
            return Ok(());
        }

        let directory = if root.recursive {
            let rollup = self.config.read().scan.rollup_depth;
            directory_key(&canonical, is_dir, known_dir, rollup)
        } else {
            // Flat roots only track their direct children
            if canonical.relative.components().count() > 1 {
                tracing::trace!(path = %canonical.path.display(), "below a flat root, event dropped");
                return Ok(());
            }
            root.path.clone()
        };

        tracing::debug!(
            path = %canonical.path.display(),
            directory = %directory.display(),
            %kind,
            ?source,
            "event accepted"
        );

        self.coalescer.push(CoalesceEvent {
            directory,
            root: canonical.root,
            recursive: root.recursive,
            relative: canonical.relative,
            reason: source.into(),
        })
    }

    /// Scan a directory now, cancelling any pending bucket for it.
    pub async fn trigger_manual_scan(&self, directory: &Path) -> Result<JobHandle> {
        let normalizer = self.normalizer();
        let directory = directory.to_path_buf();
        let (canonical, recursive) = tokio::task::spawn_blocking(move || {
            let canonical = normalizer.normalize_path(&directory)?;
            if canonical.path.exists() && !canonical.path.is_dir() {
                return Err(Error::invalid_path(
                    canonical.path.to_string_lossy(),
                    "not a directory",
                ));
            }
            let recursive = normalizer
                .root_for(&canonical.path)
                .map(|r| r.recursive)
                .unwrap_or(true);
            Ok((canonical, recursive))
        })
        .await
        .map_err(|e| Error::internal(format!("path resolution task failed: {}", e)))??;

        let handle = self
            .coalescer
            .scan_now(canonical.path, canonical.root, recursive, TriggerReason::Manual)
            .await?;
        tracing::info!(job_id = %handle.id, target = %handle.target.display(), "manual scan queued");
        Ok(handle)
    }

    /// Queue a full scan of every watched root.
    ///
    /// A root whose previous scheduled scan is still queued or running is
    /// skipped. Returns the handles of the jobs actually queued.
    pub async fn trigger_full_scan(&self) -> Result<Vec<JobHandle>> {
        let in_progress: Vec<PathBuf> = self
            .ctx
            .queue
            .snapshot()
            .into_iter()
            .filter(|j| j.reason == TriggerReason::Scheduled && !j.status.is_terminal())
            .map(|j| j.target)
            .collect();

        let mut handles = Vec::new();
        for root in self.roots() {
            if in_progress.contains(&root.path) {
                tracing::info!(
                    root = %root.path.display(),
                    "previous scheduled scan still in progress, skipping"
                );
                continue;
            }
            let handle = self
                .coalescer
                .scan_now(
                    root.path.clone(),
                    root.path.clone(),
                    root.recursive,
                    TriggerReason::Scheduled,
                )
                .await?;
            tracing::info!(job_id = %handle.id, root = %root.path.display(), "scheduled scan queued");
            handles.push(handle);
        }
        Ok(handles)
    }

    pub fn query_health(&self, filter: &HealthFilter) -> Vec<FileRecord> {
        self.ctx.ledger.query(filter)
    }

    pub fn health_counts(&self) -> HealthCounts {
        self.ctx.ledger.counts()
    }

    /// Stream of summaries as sessions complete. A lagging subscriber skips
    /// what it missed.
    pub fn subscribe_session_summaries(&self) -> impl Stream<Item = ScanSessionSummary> + Send + 'static {
        BroadcastStream::new(self.ctx.state.subscribe()).filter_map(|event| match event {
            Ok(AppEvent::SessionCompleted { summary }) => Some(summary),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "session summary subscriber lagged");
                None
            }
        })
    }

    pub async fn pending_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.coalescer.snapshot().await
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.ctx.queue.snapshot()
    }

    pub fn cancel_job(&self, id: JobId) -> Result<JobStatus> {
        self.ctx.queue.cancel(id)
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<ScanSessionSummary> {
        self.ctx.state.history(limit)
    }

    pub fn roots(&self) -> Vec<WatchedRoot> {
        self.normalizer().roots().to_vec()
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.ctx.state
    }

    /// Swap roots and tunables. On error the previous configuration stays.
    pub fn reload(&self, new: Config) -> Result<()> {
        config::validate_config(&new).map_err(|e| Error::config(format!("{:#}", e)))?;
        let normalizer = PathNormalizer::new(&new.roots)?;
        let settings = VerifySettings::from_config(&new.scan)?;

        let old = self.normalizer();
        for removed in old
            .roots()
            .iter()
            .filter(|r| !normalizer.roots().iter().any(|n| n.path == r.path))
        {
            tracing::info!(root = %removed.path.display(), "root removed, cancelling its work");
            self.coalescer.cancel_under(removed.path.clone())?;
            self.ctx.queue.cancel_under(&removed.path);
        }

        let roots = normalizer.roots().len();
        metrics::set_watched_directories(roots);
        *self.normalizer.write() = Arc::new(normalizer);
        self.ctx.verifier.set_settings(settings);
        self.ctx.reporter.set_scan_config(&new.scan);
        self.ctx.queue.set_max_workers(new.scan.max_workers);
        self.ctx.state.set_history_limit(new.storage.history_limit);
        self.coalescer.set_debounce(new.scan.debounce())?;
        self.notifications.reload(&new);
        *self.config.write() = new;

        tracing::info!(roots, "configuration reloaded");
        self.ctx.state.broadcast(AppEvent::ConfigReloaded { roots });
        Ok(())
    }

    /// Replace the watched roots, write them back to the config file when
    /// there is one, and reload.
    pub fn update_roots(&self, roots: Vec<RootConfig>) -> Result<()> {
        let mut new = self.config();
        new.roots = roots;
        self.reload(new)?;

        if let Some(ref path) = self.config_path {
            let roots = self.config.read().roots.clone();
            persist::update_roots(path, &roots).map_err(|e| Error::config(format!("{:#}", e)))?;
        }
        Ok(())
    }

    /// Stop accepting work, cancel running jobs and wait for them.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!("scheduler shutting down");
        let dropped = self.ctx.queue.drain_pending();
        if dropped > 0 {
            tracing::info!(dropped, "queued scan jobs cancelled");
        }
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("scheduler task failed: {}", e);
            }
        }
    }
}

/// Hand eligible jobs to worker tasks until shutdown, then wait for the
/// running ones to observe their cancelled tokens.
async fn dispatch_loop(ctx: Arc<JobContext>, shutdown: CancellationToken) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,
            dispatched = ctx.queue.dispatch() => {
                running.spawn(run_job(Arc::clone(&ctx), dispatched));
            }
            Some(joined) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("scan job task failed: {}", e);
                }
            }
        }
    }

    if !running.is_empty() {
        tracing::info!(running = running.len(), "waiting for running scan jobs");
    }
    while let Some(joined) = running.join_next().await {
        if let Err(e) = joined {
            tracing::error!("scan job task failed: {}", e);
        }
    }
}

async fn run_job(ctx: Arc<JobContext>, dispatched: DispatchedJob) {
    let DispatchedJob { job, cancel } = dispatched;

    tracing::info!(
        job_id = %job.id,
        target = %job.target.display(),
        reason = %job.reason,
        "scan started"
    );
    ctx.state.broadcast(AppEvent::job_started(job.info()));

    let baseline = Baseline::capture(&ctx.ledger, &job);
    let started = std::time::Instant::now();

    // Separate task so a panic inside verification fails only this job
    let work = {
        let verifier = Arc::clone(&ctx.verifier);
        let job = job.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { verifier.run(&job, &cancel).await })
    };

    let (summary, touched) = match work.await {
        Ok(Ok(outcome)) => {
            let summary = summarize(&job, &baseline, &outcome);
            (summary, outcome.touched)
        }
        Ok(Err(e)) => {
            tracing::warn!(job_id = %job.id, "scan failed: {}", e);
            let summary = ScanSessionSummary::failure(
                job.id,
                job.target.clone(),
                job.reason,
                baseline.started_at,
                e.to_string(),
            );
            (summary, Vec::new())
        }
        Err(e) => {
            tracing::error!(job_id = %job.id, "scan worker crashed: {}", e);
            let summary = ScanSessionSummary::failure(
                job.id,
                job.target.clone(),
                job.reason,
                baseline.started_at,
                format!("worker crashed: {}", e),
            );
            (summary, Vec::new())
        }
    };

    metrics::scan_finished(started.elapsed());
    if summary.failed {
        metrics::scan_failed();
    }

    let status = summary.status;
    ctx.reporter.publish(summary, &touched);
    ctx.state
        .broadcast(AppEvent::job_finished(job.id, &job.target, status));
    ctx.queue.finish(job.id, status);
}
