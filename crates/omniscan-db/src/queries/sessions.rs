//! Scan session summary history.

use chrono::Utc;
use omniscan_common::{
    Error, JobId, JobStatus, Result, ScanSessionSummary, SessionCounts, SessionId, TriggerReason,
};
use rusqlite::{params, Connection, Row};
use std::path::PathBuf;
use uuid::Uuid;

use super::{decode_time, encode_time};

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<ScanSessionSummary> {
    let id: String = row.get(0)?;
    let job_id: String = row.get(1)?;
    let directory: String = row.get(2)?;
    let reason: String = row.get(3)?;
    let status: String = row.get(4)?;
    let started_at: String = row.get(10)?;
    let finished_at: String = row.get(11)?;
    let changes: String = row.get(12)?;
    let warnings: String = row.get(15)?;

    Ok(ScanSessionSummary {
        id: SessionId::from(Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil())),
        job_id: JobId::from(Uuid::parse_str(&job_id).unwrap_or_else(|_| Uuid::nil())),
        directory: PathBuf::from(directory),
        reason: reason.parse().unwrap_or(TriggerReason::Manual),
        status: status.parse().unwrap_or(JobStatus::Failed),
        counts: SessionCounts {
            added: row.get(5)?,
            removed: row.get(6)?,
            corrupt: row.get(7)?,
            restored: row.get(8)?,
            unchanged: row.get(9)?,
        },
        started_at: decode_time(&started_at).unwrap_or_else(Utc::now),
        finished_at: decode_time(&finished_at).unwrap_or_else(Utc::now),
        changes: serde_json::from_str(&changes).unwrap_or_default(),
        failed: row.get::<_, i32>(13)? != 0,
        error: row.get(14)?,
        warnings: serde_json::from_str(&warnings).unwrap_or_default(),
    })
}

/// Store a summary.
pub fn insert(conn: &Connection, summary: &ScanSessionSummary) -> Result<()> {
    let changes = serde_json::to_string(&summary.changes)
        .map_err(|e| Error::internal(format!("Failed to serialize changes: {}", e)))?;
    let warnings = serde_json::to_string(&summary.warnings)
        .map_err(|e| Error::internal(format!("Failed to serialize warnings: {}", e)))?;

    conn.execute(
        "INSERT INTO scan_sessions (id, job_id, directory, reason, status, added, removed,
            corrupt, restored, unchanged, started_at, finished_at, changes, failed, error, warnings)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            summary.id.to_string(),
            summary.job_id.to_string(),
            summary.directory.to_string_lossy(),
            summary.reason.to_string(),
            summary.status.to_string(),
            summary.counts.added,
            summary.counts.removed,
            summary.counts.corrupt,
            summary.counts.restored,
            summary.counts.unchanged,
            encode_time(&summary.started_at),
            encode_time(&summary.finished_at),
            changes,
            summary.failed as i32,
            summary.error,
            warnings,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Most recent summaries first.
pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<ScanSessionSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, job_id, directory, reason, status, added, removed, corrupt, restored,
                    unchanged, started_at, finished_at, changes, failed, error, warnings
             FROM scan_sessions ORDER BY finished_at DESC LIMIT ?",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([limit as i64], row_to_summary)
        .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Keep only the newest `keep` summaries. Returns the number deleted.
pub fn prune(conn: &Connection, keep: usize) -> Result<usize> {
    conn.execute(
        "DELETE FROM scan_sessions WHERE id NOT IN (
            SELECT id FROM scan_sessions ORDER BY finished_at DESC LIMIT ?
         )",
        [keep as i64],
    )
    .map_err(|e| Error::database(e.to_string()))
}
