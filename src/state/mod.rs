//! Shared application state: the event bus, session summary history and the
//! persistence hooks for the SQLite store.

use anyhow::Result;
use omniscan_common::{FileRecord, HealthStatus, JobId, JobStatus, ScanSessionSummary};
use omniscan_db::pool::DbPool;
use omniscan_db::queries::{file_records, sessions};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::ledger::HealthLedger;
use crate::queue::JobInfo;

/// Upper bound on the in-memory summary history regardless of configuration.
pub const MAX_HISTORY_SIZE: usize = 1000;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Application-wide event for SSE broadcasting and summary subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A scan job left the queue and started verifying.
    JobStarted {
        #[serde(flatten)]
        job: JobInfo,
    },
    /// A scan job reached a terminal status.
    JobFinished {
        job_id: JobId,
        target: PathBuf,
        status: JobStatus,
    },
    /// One file was classified.
    FileChecked {
        job_id: JobId,
        path: PathBuf,
        status: HealthStatus,
        detail: Option<String>,
    },
    /// A scan session finished and its summary was recorded.
    SessionCompleted {
        #[serde(flatten)]
        summary: ScanSessionSummary,
    },
    /// Roots or tunables were swapped.
    ConfigReloaded { roots: usize },
}

impl AppEvent {
    pub fn job_started(job: JobInfo) -> Self {
        AppEvent::JobStarted { job }
    }

    pub fn job_finished(job_id: JobId, target: &Path, status: JobStatus) -> Self {
        AppEvent::JobFinished {
            job_id,
            target: target.to_path_buf(),
            status,
        }
    }

    pub fn file_checked(job_id: JobId, record: &FileRecord) -> Self {
        AppEvent::FileChecked {
            job_id,
            path: record.path.clone(),
            status: record.status,
            detail: record.detail.clone(),
        }
    }

    pub fn session_completed(summary: ScanSessionSummary) -> Self {
        AppEvent::SessionCompleted { summary }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::JobStarted { .. } => "job_started",
            AppEvent::JobFinished { .. } => "job_finished",
            AppEvent::FileChecked { .. } => "file_checked",
            AppEvent::SessionCompleted { .. } => "session_completed",
            AppEvent::ConfigReloaded { .. } => "config_reloaded",
        }
    }
}

pub struct AppState {
    history: RwLock<VecDeque<ScanSessionSummary>>,
    history_limit: AtomicUsize,
    db: Option<DbPool>,
    event_tx: broadcast::Sender<AppEvent>,
}

impl AppState {
    pub fn new(history_limit: usize, db: Option<DbPool>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Arc::new(Self {
            history: RwLock::new(VecDeque::new()),
            history_limit: AtomicUsize::new(history_limit.clamp(1, MAX_HISTORY_SIZE)),
            db,
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Get a clone of the event sender for use in other components.
    pub fn event_sender(&self) -> broadcast::Sender<AppEvent> {
        self.event_tx.clone()
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: AppEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    pub fn db(&self) -> Option<&DbPool> {
        self.db.as_ref()
    }

    pub fn set_history_limit(&self, limit: usize) {
        let limit = limit.clamp(1, MAX_HISTORY_SIZE);
        self.history_limit.store(limit, Ordering::Relaxed);
        self.history.write().truncate(limit);
    }

    /// Add a summary to history (newest first), persist it and broadcast it.
    pub fn record_summary(&self, summary: ScanSessionSummary) {
        let limit = self.history_limit.load(Ordering::Relaxed);
        {
            let mut history = self.history.write();
            history.push_front(summary.clone());
            history.truncate(limit);
        }

        if let Some(ref pool) = self.db {
            let persisted = pool
                .get()
                .map_err(|e| anyhow::anyhow!(e))
                .and_then(|conn| {
                    sessions::insert(&conn, &summary)?;
                    sessions::prune(&conn, limit)?;
                    Ok(())
                });
            if let Err(e) = persisted {
                tracing::warn!(session_id = %summary.id, "Failed to persist session summary: {}", e);
            }
        }

        self.broadcast(AppEvent::session_completed(summary));
    }

    /// Write changed records through to the store.
    pub fn persist_records(&self, records: &[FileRecord]) {
        let Some(ref pool) = self.db else {
            return;
        };
        if records.is_empty() {
            return;
        }
        let persisted = pool
            .get()
            .map_err(|e| anyhow::anyhow!(e))
            .and_then(|conn| Ok(file_records::upsert_many(&conn, records)?));
        if let Err(e) = persisted {
            tracing::warn!(count = records.len(), "Failed to persist file records: {}", e);
        }
    }

    /// Most recent summaries first.
    pub fn history(&self, limit: Option<usize>) -> Vec<ScanSessionSummary> {
        let history = self.history.read();
        let limit = limit.unwrap_or(history.len());
        history.iter().take(limit).cloned().collect()
    }

    /// Load persisted records into the ledger and recent summaries into
    /// history. Returns `(records, summaries)` loaded.
    pub fn restore(&self, ledger: &HealthLedger) -> Result<(usize, usize)> {
        let Some(ref pool) = self.db else {
            return Ok((0, 0));
        };
        let conn = pool.get()?;

        let records = file_records::list_all(&conn)?;
        let loaded = ledger.load(records);

        let limit = self.history_limit.load(Ordering::Relaxed);
        let summaries = sessions::list_recent(&conn, limit)?;
        let restored = summaries.len();
        *self.history.write() = summaries.into_iter().collect();

        Ok((loaded, restored))
    }
}
