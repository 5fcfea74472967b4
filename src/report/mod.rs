//! Scan session reporting: before/after diff, summary publication and the
//! gate in front of media server rescans.

use chrono::{DateTime, Utc};
use omniscan_common::{
    FileRecord, HealthChange, HealthStatus, JobStatus, ScanSessionSummary, SessionCounts,
    SessionId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::ledger::HealthLedger;
use crate::notifications::NotificationManager;
use crate::queue::ScanJob;
use crate::state::AppState;
use crate::verify::JobOutcome;

/// Ledger statuses in a job's scope before verification.
#[derive(Debug, Clone)]
pub struct Baseline {
    statuses: HashMap<PathBuf, HealthStatus>,
    pub started_at: DateTime<Utc>,
}

impl Baseline {
    pub fn capture(ledger: &HealthLedger, job: &ScanJob) -> Self {
        let statuses = ledger
            .records_in_scope(&job.target, job.recursive)
            .into_iter()
            .map(|r| (r.path, r.status))
            .collect();
        Self {
            statuses,
            started_at: job.started_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn status(&self, path: &std::path::Path) -> Option<HealthStatus> {
        self.statuses.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Diff the touched records against the baseline.
pub fn summarize(job: &ScanJob, baseline: &Baseline, outcome: &JobOutcome) -> ScanSessionSummary {
    // Last write per path wins, first-seen order kept
    let mut order: Vec<&PathBuf> = Vec::new();
    let mut latest: HashMap<&PathBuf, HealthStatus> = HashMap::new();
    for record in &outcome.touched {
        if latest.insert(&record.path, record.status).is_none() {
            order.push(&record.path);
        }
    }

    let mut counts = SessionCounts::default();
    let mut changes = Vec::new();

    for path in order {
        let after = latest[path];
        let before = baseline.status(path);
        let was_present = before.is_some_and(|s| s != HealthStatus::Missing);

        let added = !was_present && after != HealthStatus::Missing;
        if added {
            counts.added += 1;
        }
        if was_present && after == HealthStatus::Missing {
            counts.removed += 1;
        }
        if before.is_some_and(HealthStatus::is_corrupt) && after == HealthStatus::Healthy {
            counts.restored += 1;
        }
        if after.is_corrupt() {
            counts.corrupt += 1;
        }
        if before == Some(after) {
            if !added {
                counts.unchanged += 1;
            }
        } else {
            changes.push(HealthChange {
                path: path.clone(),
                from: before,
                to: after,
            });
        }
    }

    let status = if outcome.cancelled {
        JobStatus::Cancelled
    } else {
        JobStatus::Completed
    };

    ScanSessionSummary {
        id: SessionId::new(),
        job_id: job.id,
        directory: job.target.clone(),
        reason: job.reason,
        status,
        counts,
        started_at: baseline.started_at,
        finished_at: Utc::now(),
        changes,
        failed: false,
        error: None,
        warnings: outcome.warnings.clone(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Gate {
    rescan_on_restored: bool,
    dry_run: bool,
}

/// Publishes summaries and gates outbound calls.
pub struct Reporter {
    state: Arc<AppState>,
    notifications: Arc<NotificationManager>,
    gate: RwLock<Gate>,
}

impl Reporter {
    pub fn new(
        state: Arc<AppState>,
        notifications: Arc<NotificationManager>,
        scan: &ScanConfig,
    ) -> Self {
        Self {
            state,
            notifications,
            gate: RwLock::new(Gate {
                rescan_on_restored: scan.rescan_on_restored,
                dry_run: scan.dry_run,
            }),
        }
    }

    pub fn set_scan_config(&self, scan: &ScanConfig) {
        *self.gate.write() = Gate {
            rescan_on_restored: scan.rescan_on_restored,
            dry_run: scan.dry_run,
        };
    }

    /// Whether this summary should reach media servers and notifiers.
    pub fn should_notify(&self, summary: &ScanSessionSummary) -> bool {
        let gate = *self.gate.read();
        !summary.failed && summary.counts.has_library_changes(gate.rescan_on_restored)
    }

    /// Persist touched records, record the summary and, when gated through,
    /// fire the rescan triggers and notifiers without waiting for them.
    pub fn publish(&self, summary: ScanSessionSummary, touched: &[FileRecord]) {
        self.state.persist_records(touched);

        tracing::info!(
            session_id = %summary.id,
            job_id = %summary.job_id,
            directory = %summary.directory.display(),
            status = %summary.status,
            added = summary.counts.added,
            removed = summary.counts.removed,
            corrupt = summary.counts.corrupt,
            restored = summary.counts.restored,
            unchanged = summary.counts.unchanged,
            "scan session finished"
        );

        let notify = self.should_notify(&summary);
        let dry_run = self.gate.read().dry_run;
        self.state.record_summary(summary.clone());

        if !notify {
            return;
        }
        if dry_run {
            tracing::info!(
                directory = %summary.directory.display(),
                "dry run: skipping media server rescan and notifications"
            );
            return;
        }
        if self.notifications.has_targets() {
            self.notifications.spawn_delivery(summary);
        }
    }
}
