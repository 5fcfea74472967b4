//! Core type definitions: health classifications, file records, scan jobs
//! and scan session summaries.
//!
//! Enums serialize in lowercase (kebab-case for health states) and round-trip
//! through `Display`/`FromStr` so the same spelling is used in JSON, SQLite
//! and log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::ids::{JobId, SessionId};

/// Last-known health classification of a tracked media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    /// All probes passed.
    Healthy,
    /// The file has zero length.
    CorruptZeroByte,
    /// The container envelope is cut short or absent.
    CorruptTruncated,
    /// Stream metadata could not be read (or the probe timed out).
    CorruptUnreadable,
    /// Readable, but shorter than the configured minimum duration.
    IgnoredSample,
    /// The file was tracked but is gone from its directory.
    Missing,
    /// Tracked but never classified.
    Unknown,
}

impl HealthStatus {
    /// Whether this is one of the corrupt classifications.
    pub fn is_corrupt(self) -> bool {
        matches!(
            self,
            Self::CorruptZeroByte | Self::CorruptTruncated | Self::CorruptUnreadable
        )
    }

    /// Whether the file is present on disk according to this classification.
    pub fn is_present(self) -> bool {
        !matches!(self, Self::Missing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::CorruptZeroByte => "corrupt-zero-byte",
            Self::CorruptTruncated => "corrupt-truncated",
            Self::CorruptUnreadable => "corrupt-unreadable",
            Self::IgnoredSample => "ignored-sample",
            Self::Missing => "missing",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "corrupt-zero-byte" => Ok(Self::CorruptZeroByte),
            "corrupt-truncated" => Ok(Self::CorruptTruncated),
            "corrupt-unreadable" => Ok(Self::CorruptUnreadable),
            "ignored-sample" => Ok(Self::IgnoredSample),
            "missing" => Ok(Self::Missing),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid health status: {}", s)),
        }
    }
}

/// Where a raw change notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Filesystem,
    Webhook,
}

/// What happened to the path, as far as the producer can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Renamed,
    Unknown,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Renamed => write!(f, "renamed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why a scan job exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerReason {
    Filesystem,
    Webhook,
    Manual,
    /// Startup or interval full scan
    Scheduled,
}

impl From<EventSource> for TriggerReason {
    fn from(source: EventSource) -> Self {
        match source {
            EventSource::Filesystem => Self::Filesystem,
            EventSource::Webhook => Self::Webhook,
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem => write!(f, "filesystem"),
            Self::Webhook => write!(f, "webhook"),
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl std::str::FromStr for TriggerReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filesystem" => Ok(Self::Filesystem),
            "webhook" => Ok(Self::Webhook),
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            _ => Err(format!("Invalid trigger reason: {}", s)),
        }
    }
}

/// Lifecycle state of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Health record for one tracked media file.
///
/// Exactly one record exists per canonical path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    /// SHA-256 over size, head and tail; lets a touched-but-identical file
    /// skip re-probing.
    pub fingerprint: Option<String>,
    /// Reason attached to a non-healthy classification.
    pub detail: Option<String>,
}

impl FileRecord {
    pub fn new(
        path: PathBuf,
        size: u64,
        modified_at: Option<DateTime<Utc>>,
        status: HealthStatus,
    ) -> Self {
        Self {
            path,
            size,
            modified_at,
            status,
            checked_at: Utc::now(),
            fingerprint: None,
            detail: None,
        }
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Copy of this record reclassified as missing.
    pub fn into_missing(mut self) -> Self {
        self.status = HealthStatus::Missing;
        self.checked_at = Utc::now();
        self.detail = Some("no longer present in directory listing".to_string());
        self
    }

    /// Whether size and modification time match the given stat.
    pub fn same_stat(&self, size: u64, modified_at: Option<DateTime<Utc>>) -> bool {
        self.size == size && self.modified_at.is_some() && self.modified_at == modified_at
    }
}

/// A health transition observed during one scan session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChange {
    pub path: PathBuf,
    /// `None` when the file was not tracked before the session.
    pub from: Option<HealthStatus>,
    pub to: HealthStatus,
}

/// Per-session outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub added: u32,
    pub removed: u32,
    pub corrupt: u32,
    pub restored: u32,
    pub unchanged: u32,
}

impl SessionCounts {
    /// Whether the media server's view of the library is now stale.
    pub fn has_library_changes(&self, include_restored: bool) -> bool {
        self.added > 0 || self.removed > 0 || (include_restored && self.restored > 0)
    }
}

/// Immutable result of one scan job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSessionSummary {
    pub id: SessionId,
    pub job_id: JobId,
    pub directory: PathBuf,
    pub reason: TriggerReason,
    pub status: JobStatus,
    pub counts: SessionCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub changes: Vec<HealthChange>,
    pub failed: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ScanSessionSummary {
    /// Summary for a job that failed before producing any outcome.
    pub fn failure(
        job_id: JobId,
        directory: PathBuf,
        reason: TriggerReason,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            id: SessionId::new(),
            job_id,
            directory,
            reason,
            status: JobStatus::Failed,
            counts: SessionCounts::default(),
            started_at,
            finished_at: Utc::now(),
            changes: Vec::new(),
            failed: true,
            error: Some(error),
            warnings: Vec::new(),
        }
    }
}
