//! Prometheus metrics.
//!
//! Recording goes through the `metrics` facade and costs nothing until
//! [`install`] sets the global recorder. The server renders it at `/metrics`.

use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use omniscan_common::HealthStatus;
use std::sync::OnceLock;
use std::time::Duration;

pub const SCANNED_FILES_TOTAL: &str = "omniscan_scanned_files_total";
pub const MISSING_FILES_TOTAL: &str = "omniscan_missing_files_total";
pub const TRIGGERED_SCANS_TOTAL: &str = "omniscan_triggered_scans_total";
pub const SCAN_ERRORS_TOTAL: &str = "omniscan_scan_errors_total";
pub const WATCHED_DIRECTORIES: &str = "omniscan_watched_directories";
pub const PENDING_SCANS: &str = "omniscan_pending_scans";
pub const HEALTH_CHECKS_TOTAL: &str = "omniscan_health_checks_total";
pub const HEALTH_CHECK_FAILURES: &str = "omniscan_health_check_failures";
pub const SCAN_DURATION_SECONDS: &str = "omniscan_scan_duration_seconds";

/// Job durations range from a single file to a full library pass.
const SCAN_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0];

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Idempotent. Returns `None` when another recorder already owns the global
/// slot.
pub fn install() -> Option<&'static PrometheusHandle> {
    HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new().set_buckets_for_metric(
                Matcher::Full(SCAN_DURATION_SECONDS.to_string()),
                SCAN_DURATION_BUCKETS,
            );
            let builder = match builder {
                Ok(builder) => builder,
                Err(e) => {
                    tracing::warn!("Ignoring scan duration buckets: {}", e);
                    PrometheusBuilder::new()
                }
            };
            match builder.install_recorder() {
                Ok(handle) => {
                    describe();
                    tracing::debug!("Prometheus recorder installed");
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!("Metrics recorder not installed: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

/// Current metrics in the Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE
        .get()
        .and_then(Option::as_ref)
        .map(PrometheusHandle::render)
}

fn describe() {
    describe_counter!(SCANNED_FILES_TOTAL, "Total number of files scanned");
    describe_counter!(MISSING_FILES_TOTAL, "Total number of missing files detected");
    describe_counter!(
        TRIGGERED_SCANS_TOTAL,
        "Total number of media server scans triggered"
    );
    describe_counter!(SCAN_ERRORS_TOTAL, "Total number of failed scan jobs");
    describe_gauge!(
        WATCHED_DIRECTORIES,
        "Number of directories currently being watched"
    );
    describe_gauge!(
        PENDING_SCANS,
        "Number of scans currently pending (debouncing)"
    );
    describe_counter!(
        HEALTH_CHECKS_TOTAL,
        "Total number of file health checks performed"
    );
    describe_counter!(HEALTH_CHECK_FAILURES, "Total number of failed health checks");
    describe_histogram!(SCAN_DURATION_SECONDS, "Time spent scanning directories");
}

pub fn file_scanned() {
    counter!(SCANNED_FILES_TOTAL).increment(1);
}

pub fn files_missing(count: usize) {
    counter!(MISSING_FILES_TOTAL).increment(count as u64);
}

pub fn rescan_triggered() {
    counter!(TRIGGERED_SCANS_TOTAL).increment(1);
}

pub fn scan_failed() {
    counter!(SCAN_ERRORS_TOTAL).increment(1);
}

/// A file went through a full check and ended up `status`.
pub fn health_checked(status: HealthStatus) {
    counter!(HEALTH_CHECKS_TOTAL).increment(1);
    if status.is_corrupt() {
        counter!(HEALTH_CHECK_FAILURES).increment(1);
    }
}

pub fn set_watched_directories(count: usize) {
    gauge!(WATCHED_DIRECTORIES).set(count as f64);
}

pub fn set_pending_scans(count: usize) {
    gauge!(PENDING_SCANS).set(count as f64);
}

pub fn scan_finished(elapsed: Duration) {
    histogram!(SCAN_DURATION_SECONDS).record(elapsed.as_secs_f64());
}
