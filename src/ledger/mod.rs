//! Health ledger: the authoritative current classification of every tracked
//! media file.
//!
//! One coarse `RwLock` over a map; critical sections are map operations only.

use omniscan_common::paths::is_in_scope;
use omniscan_common::{FileRecord, HealthStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Query filter for [`HealthLedger::query`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthFilter {
    #[serde(default)]
    pub status: Option<HealthStatus>,
    /// Only corrupt-* records
    #[serde(default)]
    pub corrupt_only: bool,
    /// Only records under this directory
    #[serde(default)]
    pub under: Option<PathBuf>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl HealthFilter {
    fn matches(&self, record: &FileRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if self.corrupt_only && !record.status.is_corrupt() {
            return false;
        }
        if let Some(ref under) = self.under {
            if !record.path.starts_with(under) {
                return false;
            }
        }
        true
    }
}

/// Record counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub total: usize,
    pub healthy: usize,
    pub corrupt_zero_byte: usize,
    pub corrupt_truncated: usize,
    pub corrupt_unreadable: usize,
    pub ignored_sample: usize,
    pub missing: usize,
    pub unknown: usize,
}

impl HealthCounts {
    pub fn corrupt(&self) -> usize {
        self.corrupt_zero_byte + self.corrupt_truncated + self.corrupt_unreadable
    }
}

#[derive(Debug, Default)]
pub struct HealthLedger {
    records: RwLock<HashMap<PathBuf, FileRecord>>,
}

impl HealthLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<FileRecord> {
        self.records.read().get(path).cloned()
    }

    /// Insert or replace, returning the previous record.
    pub fn upsert(&self, record: FileRecord) -> Option<FileRecord> {
        self.records.write().insert(record.path.clone(), record)
    }

    pub fn remove(&self, path: &Path) -> Option<FileRecord> {
        self.records.write().remove(path)
    }

    /// Records matching `filter`, sorted by path.
    pub fn query(&self, filter: &HealthFilter) -> Vec<FileRecord> {
        let mut matched: Vec<FileRecord> = self
            .records
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        matched
    }

    /// Records a scan of `dir` is responsible for.
    pub fn records_in_scope(&self, dir: &Path, recursive: bool) -> Vec<FileRecord> {
        self.records
            .read()
            .values()
            .filter(|r| is_in_scope(&r.path, dir, recursive))
            .cloned()
            .collect()
    }

    /// Whether any record lives strictly beneath `path`. Used to recognise a
    /// deleted directory.
    pub fn has_descendants(&self, path: &Path) -> bool {
        self.records
            .read()
            .keys()
            .any(|p| p != path && p.starts_with(path))
    }

    pub fn counts(&self) -> HealthCounts {
        let records = self.records.read();
        let mut counts = HealthCounts {
            total: records.len(),
            ..Default::default()
        };
        for record in records.values() {
            match record.status {
                HealthStatus::Healthy => counts.healthy += 1,
                HealthStatus::CorruptZeroByte => counts.corrupt_zero_byte += 1,
                HealthStatus::CorruptTruncated => counts.corrupt_truncated += 1,
                HealthStatus::CorruptUnreadable => counts.corrupt_unreadable += 1,
                HealthStatus::IgnoredSample => counts.ignored_sample += 1,
                HealthStatus::Missing => counts.missing += 1,
                HealthStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Bulk-load persisted records, replacing any with the same path.
    pub fn load(&self, records: impl IntoIterator<Item = FileRecord>) -> usize {
        let mut map = self.records.write();
        let mut loaded = 0;
        for record in records {
            map.insert(record.path.clone(), record);
            loaded += 1;
        }
        loaded
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
