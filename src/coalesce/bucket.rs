use omniscan_common::TriggerReason;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Events accumulated for one directory while its debounce window is open.
#[derive(Debug)]
pub struct PendingBucket {
    pub directory: PathBuf,
    pub root: PathBuf,
    pub recursive: bool,
    changed: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    pub first_seen: Instant,
    pub last_event: Instant,
    pub deadline: Instant,
    pub reason: TriggerReason,
    pub event_count: u64,
}

impl PendingBucket {
    pub fn new(
        directory: PathBuf,
        root: PathBuf,
        recursive: bool,
        reason: TriggerReason,
        now: Instant,
        debounce: Duration,
    ) -> Self {
        Self {
            directory,
            root,
            recursive,
            changed: Vec::new(),
            seen: HashSet::new(),
            first_seen: now,
            last_event: now,
            deadline: now + debounce,
            reason,
            event_count: 0,
        }
    }

    /// Add a changed path and slide the deadline.
    pub fn record(&mut self, relative: PathBuf, now: Instant, debounce: Duration) {
        if self.seen.insert(relative.clone()) {
            self.changed.push(relative);
        }
        self.event_count += 1;
        self.last_event = now;
        self.deadline = now + debounce;
    }

    /// Changed paths in first-arrival order.
    pub fn changed(&self) -> &[PathBuf] {
        &self.changed
    }

    pub fn into_changed(self) -> Vec<PathBuf> {
        self.changed
    }

    pub fn info(&self, now: Instant) -> BucketInfo {
        BucketInfo {
            directory: self.directory.clone(),
            root: self.root.clone(),
            changed: self.changed.clone(),
            event_count: self.event_count,
            reason: self.reason,
            age_ms: now.saturating_duration_since(self.first_seen).as_millis() as u64,
            idle_ms: now.saturating_duration_since(self.last_event).as_millis() as u64,
            fires_in_ms: self.deadline.saturating_duration_since(now).as_millis() as u64,
        }
    }
}

/// Snapshot of a pending bucket for the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketInfo {
    pub directory: PathBuf,
    pub root: PathBuf,
    pub changed: Vec<PathBuf>,
    pub event_count: u64,
    pub reason: TriggerReason,
    pub age_ms: u64,
    pub idle_ms: u64,
    pub fires_in_ms: u64,
}
