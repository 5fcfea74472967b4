//! Per-file health classification.

use chrono::{DateTime, Utc};
use omniscan_common::{FileRecord, HealthStatus};
use omniscan_probe::Integrity;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::prober::Prober;
use crate::metrics;

/// Classify one listed file. Blocking.
///
/// Checks run cheapest first: stat, zero-byte, unchanged stat against the
/// previous record, fingerprint against the previous record, structural
/// integrity, then the metadata prober. With `min_duration` set, a file the
/// prober reports as shorter is recorded as an ignored sample.
pub fn classify_file(
    path: &Path,
    previous: Option<&FileRecord>,
    prober: &dyn Prober,
    min_duration: Option<Duration>,
) -> FileRecord {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return match previous {
                Some(prev) => prev.clone().into_missing(),
                None => FileRecord::new(path.to_path_buf(), 0, None, HealthStatus::Missing)
                    .with_detail("vanished before it could be checked"),
            };
        }
        Err(e) => {
            return FileRecord::new(path.to_path_buf(), 0, None, HealthStatus::CorruptUnreadable)
                .with_detail(format!("stat failed: {}", e));
        }
    };

    let size = meta.len();
    let modified_at = meta.modified().ok().map(DateTime::<Utc>::from);
    let record = |status| FileRecord::new(path.to_path_buf(), size, modified_at, status);

    if size == 0 {
        metrics::health_checked(HealthStatus::CorruptZeroByte);
        return record(HealthStatus::CorruptZeroByte).with_detail("file is empty");
    }

    // A sample verdict only stands while samples are still being ignored
    let reusable = previous.filter(|p| {
        !matches!(p.status, HealthStatus::Unknown | HealthStatus::Missing)
            && p.status != HealthStatus::CorruptZeroByte
            && (p.status != HealthStatus::IgnoredSample || min_duration.is_some())
    });

    if let Some(prev) = reusable {
        if prev.same_stat(size, modified_at) {
            let mut reused = prev.clone();
            reused.checked_at = Utc::now();
            return reused;
        }
    }

    let fingerprint = match omniscan_probe::fingerprint(path) {
        Ok(fp) => fp,
        Err(e) => {
            return record(HealthStatus::CorruptUnreadable).with_detail(format!("read failed: {}", e));
        }
    };

    if let Some(prev) = reusable {
        if prev.size == size && prev.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            tracing::trace!(path = %path.display(), "fingerprint unchanged, reusing classification");
            let mut reused = record(prev.status).with_fingerprint(Some(fingerprint));
            reused.detail = prev.detail.clone();
            return reused;
        }
    }

    let record = |status| record(status).with_fingerprint(Some(fingerprint.clone()));
    let checked = full_check(path, prober, min_duration, record);
    metrics::health_checked(checked.status);
    checked
}

/// Structural integrity, then the metadata prober.
fn full_check(
    path: &Path,
    prober: &dyn Prober,
    min_duration: Option<Duration>,
    record: impl Fn(HealthStatus) -> FileRecord,
) -> FileRecord {
    match omniscan_probe::check_integrity(path) {
        Ok(Integrity::Intact) => {}
        Ok(Integrity::Truncated(reason)) => {
            return record(HealthStatus::CorruptTruncated).with_detail(reason);
        }
        Err(e) => {
            return record(HealthStatus::CorruptUnreadable).with_detail(e.to_string());
        }
    }

    if !prober.supports(path) {
        return record(HealthStatus::Healthy);
    }
    let info = match prober.probe(path) {
        Ok(info) => info,
        Err(e) => return record(HealthStatus::CorruptUnreadable).with_detail(e.to_string()),
    };

    let duration = info.duration_ms.map(Duration::from_millis);
    match (duration, min_duration) {
        (Some(duration), Some(min)) if duration < min => {
            tracing::info!(
                path = %path.display(),
                duration_secs = duration.as_secs(),
                "ignoring sample or short file"
            );
            record(HealthStatus::IgnoredSample)
                .with_detail(format!("Sample ({}s)", duration.as_secs()))
        }
        _ => record(HealthStatus::Healthy),
    }
}

/// Record for a symlink whose target is gone.
pub fn broken_symlink_record(path: &Path) -> FileRecord {
    FileRecord::new(path.to_path_buf(), 0, None, HealthStatus::CorruptUnreadable)
        .with_detail("broken symlink")
}
