//! Verification worker pool.
//!
//! A dispatched job enumerates its target, marks vanished records missing,
//! and classifies every listed file. Files within one job run concurrently
//! up to `intra_job_fanout`; all jobs share `max_workers` probe permits.

pub mod classify;
pub mod prober;
pub mod walk;

pub use classify::classify_file;
pub use prober::{default_prober, CompositeProber, FfprobeProber, Prober, RustProber};
pub use walk::{IgnoreSet, Listing};

use omniscan_common::{Error, FileRecord, HealthStatus, Result};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::ledger::HealthLedger;
use crate::metrics;
use crate::queue::ScanJob;
use crate::state::{AppEvent, AppState};
use walk::WalkOptions;

/// Tunables for verification, rebuilt on reload.
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub intra_job_fanout: usize,
    pub probe_timeout: Duration,
    pub extensions: Vec<String>,
    pub ignore: IgnoreSet,
    pub symlink_check: bool,
    pub deletion_threshold: usize,
    pub abort_on_mass_deletion: bool,
    /// Probed durations below this are recorded as ignored samples
    pub min_duration: Option<Duration>,
    /// Shared by every job running under these settings
    probe_permits: Arc<Semaphore>,
}

impl VerifySettings {
    pub fn from_config(scan: &ScanConfig) -> Result<Self> {
        Ok(Self {
            intra_job_fanout: scan.intra_job_fanout.max(1),
            probe_timeout: scan.probe_timeout(),
            extensions: scan.media_extensions.clone(),
            ignore: IgnoreSet::new(&scan.ignore_patterns)?,
            symlink_check: scan.symlink_check,
            deletion_threshold: scan.deletion_threshold,
            abort_on_mass_deletion: scan.abort_on_mass_deletion,
            min_duration: scan.min_duration(),
            probe_permits: Arc::new(Semaphore::new(scan.max_workers.max(1))),
        })
    }

    fn walk_options(&self, recursive: bool) -> WalkOptions<'_> {
        WalkOptions {
            recursive,
            extensions: &self.extensions,
            ignore: &self.ignore,
            symlink_check: self.symlink_check,
        }
    }
}

/// What a job did to the ledger.
#[derive(Debug, Default)]
pub struct JobOutcome {
    /// Records written during the job, in completion order
    pub touched: Vec<FileRecord>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

pub struct Verifier {
    ledger: Arc<HealthLedger>,
    state: Arc<AppState>,
    prober: Arc<dyn Prober>,
    settings: RwLock<Arc<VerifySettings>>,
}

impl Verifier {
    pub fn new(
        ledger: Arc<HealthLedger>,
        state: Arc<AppState>,
        prober: Arc<dyn Prober>,
        settings: VerifySettings,
    ) -> Self {
        Self {
            ledger,
            state,
            prober,
            settings: RwLock::new(Arc::new(settings)),
        }
    }

    /// Swap settings. Running jobs keep the ones they started with.
    pub fn set_settings(&self, settings: VerifySettings) {
        *self.settings.write() = Arc::new(settings);
    }

    pub fn settings(&self) -> Arc<VerifySettings> {
        Arc::clone(&self.settings.read())
    }

    /// Verify one job's target.
    ///
    /// Fails with `JobFailure` when the watched root is unavailable or the
    /// target cannot be fully listed; nothing is marked missing then.
    /// Per-file problems end up in the records.
    pub async fn run(&self, job: &ScanJob, cancel: &CancellationToken) -> Result<JobOutcome> {
        let settings = self.settings();
        let mut outcome = JobOutcome::default();

        if !root_available(&job.root).await {
            return Err(Error::job_failure(
                job.id,
                format!("watched root unavailable: {}", job.root.display()),
            ));
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return Ok(outcome);
        }

        let listing = {
            let settings = Arc::clone(&settings);
            let target = job.target.clone();
            let recursive = job.recursive;
            tokio::task::spawn_blocking(move || {
                walk::enumerate(&target, settings.walk_options(recursive))
            })
            .await
            .map_err(|e| Error::job_failure(job.id, format!("enumeration failed: {}", e)))?
            .map_err(|e| Error::job_failure(job.id, format!("enumeration failed: {}", e)))?
        };

        tracing::debug!(
            job_id = %job.id,
            target = %job.target.display(),
            files = listing.files.len(),
            broken = listing.broken_symlinks.len(),
            hints = job.hint_paths.len(),
            "enumerated scan target"
        );
        outcome.warnings.extend(listing.warnings.iter().cloned());

        self.mark_missing(job, &listing, &settings, &mut outcome);

        for path in &listing.broken_symlinks {
            let record = classify::broken_symlink_record(path);
            self.commit(job, record.clone());
            outcome.touched.push(record);
        }

        outcome.touched.extend(self.classify_all(job, &listing, &settings, cancel).await);
        outcome.cancelled = cancel.is_cancelled();
        Ok(outcome)
    }

    fn mark_missing(
        &self,
        job: &ScanJob,
        listing: &Listing,
        settings: &VerifySettings,
        outcome: &mut JobOutcome,
    ) {
        let vanished: Vec<FileRecord> = self
            .ledger
            .records_in_scope(&job.target, job.recursive)
            .into_iter()
            .filter(|r| r.status != HealthStatus::Missing && !listing.contains(&r.path))
            .collect();

        if vanished.is_empty() {
            return;
        }

        if settings.abort_on_mass_deletion && vanished.len() > settings.deletion_threshold {
            let warning = format!(
                "{} tracked files vanished under {} (threshold {}); none were marked missing",
                vanished.len(),
                job.target.display(),
                settings.deletion_threshold
            );
            tracing::warn!(job_id = %job.id, "{}", warning);
            outcome.warnings.push(warning);
            return;
        }

        metrics::files_missing(vanished.len());
        for record in vanished {
            let record = record.into_missing();
            self.commit(job, record.clone());
            outcome.touched.push(record);
        }
    }

    async fn classify_all(
        &self,
        job: &ScanJob,
        listing: &Listing,
        settings: &Arc<VerifySettings>,
        cancel: &CancellationToken,
    ) -> Vec<FileRecord> {
        let fanout = Arc::new(Semaphore::new(settings.intra_job_fanout));
        let mut tasks = JoinSet::new();

        for path in &listing.files {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&fanout).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let path = path.clone();
            let ledger = Arc::clone(&self.ledger);
            let state = Arc::clone(&self.state);
            let prober = Arc::clone(&self.prober);
            let settings = Arc::clone(settings);
            let job_id = job.id;

            tasks.spawn(async move {
                let _fanout = permit;
                let _probe = settings.probe_permits.acquire().await;
                let previous = ledger.get(&path);
                let record = check_with_timeout(
                    &path,
                    previous,
                    prober,
                    settings.probe_timeout,
                    settings.min_duration,
                )
                .await;
                metrics::file_scanned();
                ledger.upsert(record.clone());
                state.broadcast(AppEvent::file_checked(job_id, &record));
                record
            });
        }

        if cancel.is_cancelled() {
            tracing::info!(
                job_id = %job.id,
                in_flight = tasks.len(),
                "scan cancelled, waiting for in-flight checks"
            );
        }

        let mut records = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) if e.is_panic() => {
                    tracing::error!(job_id = %job.id, "file check panicked, failing job");
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(e) => tracing::error!(job_id = %job.id, "file check task failed: {}", e),
            }
        }
        records
    }

    fn commit(&self, job: &ScanJob, record: FileRecord) {
        let event = AppEvent::file_checked(job.id, &record);
        self.ledger.upsert(record);
        self.state.broadcast(event);
    }
}

async fn root_available(root: &Path) -> bool {
    tokio::fs::metadata(root)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Run the blocking classification under the per-file deadline.
async fn check_with_timeout(
    path: &Path,
    previous: Option<FileRecord>,
    prober: Arc<dyn Prober>,
    timeout: Duration,
    min_duration: Option<Duration>,
) -> FileRecord {
    let fallback = |detail: String, previous: Option<&FileRecord>| {
        let (size, modified_at) = previous.map(|p| (p.size, p.modified_at)).unwrap_or((0, None));
        FileRecord::new(path.to_path_buf(), size, modified_at, HealthStatus::CorruptUnreadable)
            .with_detail(detail)
    };

    let owned_path = path.to_path_buf();
    let prev = previous.clone();
    let task = tokio::task::spawn_blocking(move || {
        classify_file(&owned_path, prev.as_ref(), prober.as_ref(), min_duration)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(record)) => record,
        // A panic is a worker crash, not a file outcome: it fails the job
        Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Ok(Err(e)) => {
            tracing::error!(path = %path.display(), "file check cancelled: {}", e);
            fallback(format!("check aborted: {}", e), previous.as_ref())
        }
        Err(_) => {
            tracing::warn!(
                path = %path.display(),
                timeout_secs = timeout.as_secs(),
                "probe timed out"
            );
            fallback("probe timed out".to_string(), previous.as_ref())
        }
    }
}
