//! Scheduler integration tests: ingest, debounce, manual scans and the
//! session summaries they produce.

mod common;

use assert_matches::assert_matches;
use common::{mkv_bytes, truncated_mkv_bytes, SlowProber, TestHarness};
use futures::StreamExt;
use omniscan::config::RootConfig;
use omniscan::ledger::HealthFilter;
use omniscan::scheduler::periodic;
use omniscan::state::AppEvent;
use omniscan_common::paths::subtrees_overlap;
use omniscan_common::{
    Error, EventKind, EventSource, HealthStatus, JobId, JobStatus, TriggerReason,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Manual scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_scan_classifies_directory() {
    let h = TestHarness::new();
    h.write("Show/good.mkv", &mkv_bytes());
    h.write("Show/empty.mkv", b"");
    h.write("Show/short.mkv", &truncated_mkv_bytes());
    h.write("Show/notes.txt", b"not media");

    let handle = h
        .scheduler
        .trigger_manual_scan(&h.root.join("Show"))
        .await
        .unwrap();
    assert_eq!(handle.wait().await, JobStatus::Completed);

    let summary = h.summary_for(handle.id).await;
    assert_eq!(summary.reason, TriggerReason::Manual);
    assert_eq!(summary.counts.added, 3);
    assert_eq!(summary.counts.corrupt, 2);
    assert!(!summary.failed);

    let corrupt = h.scheduler.query_health(&HealthFilter {
        corrupt_only: true,
        ..Default::default()
    });
    assert_eq!(corrupt.len(), 2);
    let statuses: Vec<HealthStatus> = corrupt.iter().map(|r| r.status).collect();
    assert!(statuses.contains(&HealthStatus::CorruptZeroByte));
    assert!(statuses.contains(&HealthStatus::CorruptTruncated));
    assert_eq!(h.scheduler.health_counts().total, 3);
}

#[tokio::test]
async fn rescan_reports_unchanged_removed_and_restored() {
    let h = TestHarness::new();
    let good = h.write("Show/good.mkv", &mkv_bytes());
    let broken = h.write("Show/broken.mkv", b"");
    let doomed = h.write("Show/doomed.mkv", &mkv_bytes());
    let dir = h.root.join("Show");

    let first = h.scheduler.trigger_manual_scan(&dir).await.unwrap();
    first.wait().await;

    std::fs::write(&broken, mkv_bytes()).unwrap();
    std::fs::remove_file(&doomed).unwrap();

    let second = h.scheduler.trigger_manual_scan(&dir).await.unwrap();
    second.wait().await;
    let summary = h.summary_for(second.id).await;

    assert_eq!(summary.counts.added, 0);
    assert_eq!(summary.counts.unchanged, 1);
    assert_eq!(summary.counts.removed, 1);
    assert_eq!(summary.counts.restored, 1);
    assert_eq!(summary.counts.corrupt, 0);

    let missing = h.scheduler.query_health(&HealthFilter {
        status: Some(HealthStatus::Missing),
        ..Default::default()
    });
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].path, doomed);
    assert!(summary.changes.iter().all(|c| c.path != good));
}

#[tokio::test]
async fn manual_scan_outside_roots_is_rejected() {
    let h = TestHarness::new();
    let other = tempfile::tempdir().unwrap();

    let err = h
        .scheduler
        .trigger_manual_scan(&other.path().canonicalize().unwrap())
        .await
        .unwrap_err();
    assert_matches!(err, Error::OutOfScope(_));
}

#[tokio::test]
async fn manual_scan_of_file_is_invalid() {
    let h = TestHarness::new();
    let file = h.write("movie.mkv", &mkv_bytes());

    let err = h.scheduler.trigger_manual_scan(&file).await.unwrap_err();
    assert_matches!(err, Error::InvalidPath { .. });
}

#[tokio::test]
async fn cancel_finished_job_reports_its_status() {
    let h = TestHarness::new();
    h.write("a.mkv", &mkv_bytes());

    let handle = h.scheduler.trigger_manual_scan(&h.root).await.unwrap();
    handle.wait().await;

    assert_eq!(
        h.scheduler.cancel_job(handle.id).unwrap(),
        JobStatus::Completed
    );
    assert_matches!(
        h.scheduler.cancel_job(omniscan_common::JobId::new()),
        Err(Error::NotFound(_))
    );
}

#[tokio::test]
async fn summaries_are_streamed_and_persisted() {
    let h = TestHarness::new();
    h.write("Film/film.mkv", &mkv_bytes());
    let mut summaries = Box::pin(h.scheduler.subscribe_session_summaries());

    let handle = h
        .scheduler
        .trigger_manual_scan(&h.root.join("Film"))
        .await
        .unwrap();

    let streamed = tokio::time::timeout(Duration::from_secs(10), summaries.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(streamed.job_id, handle.id);
    assert_eq!(streamed.counts.added, 1);

    let conn = h.db.get().unwrap();
    let stored = omniscan_db::queries::sessions::list_recent(&conn, 10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].job_id, handle.id);
    let record =
        omniscan_db::queries::file_records::get(&conn, &h.root.join("Film/film.mkv")).unwrap();
    assert_eq!(record.unwrap().status, HealthStatus::Healthy);
}

// ---------------------------------------------------------------------------
// Ingest and debounce
// ---------------------------------------------------------------------------

fn ingest(h: &TestHarness, path: &Path) {
    h.scheduler
        .ingest_event(path.to_str().unwrap(), EventSource::Filesystem, EventKind::Modified)
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn burst_settles_into_one_job() {
    let h = TestHarness::new();
    let a = h.write("Show/a.mkv", &mkv_bytes());
    let b = h.write("Show/b.mkv", &mkv_bytes());

    for _ in 0..5 {
        ingest(&h, &a);
        ingest(&h, &b);
    }

    let pending = h.scheduler.pending_buckets().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].directory, h.root.join("Show"));
    assert_eq!(pending[0].event_count, 10);
    assert_eq!(pending[0].changed.len(), 2);

    tokio::time::advance(Duration::from_millis(500)).await;
    assert_eq!(h.scheduler.pending_buckets().await.unwrap().len(), 1);
    assert!(h.scheduler.jobs().is_empty());

    tokio::time::advance(Duration::from_millis(600)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());
    let jobs = h.scheduler.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].target, h.root.join("Show"));
    assert_eq!(jobs[0].reason, TriggerReason::Filesystem);
    assert_eq!(jobs[0].hint_count, 2);
}

#[tokio::test(start_paused = true)]
async fn manual_scan_cancels_pending_bucket() {
    let h = TestHarness::new();
    let file = h.write("Show/a.mkv", &mkv_bytes());
    ingest(&h, &file);
    assert_eq!(h.scheduler.pending_buckets().await.unwrap().len(), 1);

    let handle = h
        .scheduler
        .trigger_manual_scan(&h.root.join("Show"))
        .await
        .unwrap();
    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Only the manual job, the bucket never fired
    let jobs = h.scheduler.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, handle.id);
    assert_eq!(jobs[0].reason, TriggerReason::Manual);
}

#[tokio::test(start_paused = true)]
async fn rollup_depth_groups_under_ancestor() {
    let h = TestHarness::with_config(|c| c.scan.rollup_depth = Some(1));
    let e1 = h.write("tv/Show/Season 1/e1.mkv", &mkv_bytes());
    let e2 = h.write("tv/Other/e2.mkv", &mkv_bytes());
    let m = h.write("movies/Film/film.mkv", &mkv_bytes());

    ingest(&h, &e1);
    ingest(&h, &e2);
    ingest(&h, &m);

    let pending = h.scheduler.pending_buckets().await.unwrap();
    let dirs: Vec<_> = pending.iter().map(|b| b.directory.clone()).collect();
    assert_eq!(dirs, vec![h.root.join("movies"), h.root.join("tv")]);
}

#[tokio::test(start_paused = true)]
async fn ingest_drops_ignored_hidden_and_non_media() {
    let h = TestHarness::with_config(|c| c.scan.ignore_patterns = vec!["*.partial.mkv".into()]);
    let partial = h.write("Show/a.partial.mkv", &mkv_bytes());
    let hidden = h.write("Show/.hidden.mkv", &mkv_bytes());
    let text = h.write("Show/readme.txt", b"text");

    ingest(&h, &partial);
    ingest(&h, &hidden);
    ingest(&h, &text);

    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ingest_reports_normalization_errors() {
    let h = TestHarness::new();

    assert_matches!(
        h.scheduler
            .ingest_event("relative/path.mkv", EventSource::Webhook, EventKind::Created),
        Err(Error::InvalidPath { .. })
    );
    assert_matches!(
        h.scheduler
            .ingest_event("/definitely/elsewhere/a.mkv", EventSource::Webhook, EventKind::Created),
        Err(Error::OutOfScope(_))
    );
}

#[tokio::test(start_paused = true)]
async fn flat_root_drops_nested_events() {
    let h = TestHarness::with_config(|_| {});
    let root = h.root.clone();
    h.scheduler
        .update_roots(vec![RootConfig {
            path: root.clone(),
            enabled: true,
            recursive: false,
        }])
        .unwrap();

    let top = h.write("top.mkv", &mkv_bytes());
    let nested = h.write("sub/nested.mkv", &mkv_bytes());
    ingest(&h, &top);
    ingest(&h, &nested);

    let pending = h.scheduler.pending_buckets().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].directory, root);
    assert_eq!(pending[0].changed.len(), 1);
}

// ---------------------------------------------------------------------------
// Reload and shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reload_removing_root_cancels_its_buckets() {
    let h = TestHarness::new();
    let file = h.write("Show/a.mkv", &mkv_bytes());
    ingest(&h, &file);
    assert_eq!(h.scheduler.pending_buckets().await.unwrap().len(), 1);

    let mut config = h.scheduler.config();
    config.roots.clear();
    h.scheduler.reload(config).unwrap();

    assert!(h.scheduler.pending_buckets().await.unwrap().is_empty());
    assert!(h.scheduler.roots().is_empty());
    assert_matches!(
        h.scheduler
            .ingest_event(file.to_str().unwrap(), EventSource::Filesystem, EventKind::Modified),
        Err(Error::OutOfScope(_))
    );
}

#[tokio::test]
async fn invalid_reload_keeps_previous_config() {
    let h = TestHarness::new();
    let mut config = h.scheduler.config();
    config.scan.max_workers = 0;

    assert_matches!(h.scheduler.reload(config), Err(Error::Config(_)));
    assert_eq!(h.scheduler.config().scan.max_workers, 4);
    assert_eq!(h.scheduler.roots().len(), 1);
}

#[tokio::test]
async fn shutdown_rejects_new_work() {
    let h = TestHarness::new();
    h.scheduler.shutdown().await;

    assert!(h.scheduler.trigger_manual_scan(&h.root).await.is_err());
}

// ---------------------------------------------------------------------------
// Worker failures, cancellation and overlap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_check_fails_job_and_releases_subtree() {
    let prober = Arc::new(SlowProber::panicking(Duration::from_millis(200)));
    let h = TestHarness::with_prober(prober, |_| {});
    h.write("Show/e1.mkv", &mkv_bytes());

    let first = h
        .scheduler
        .trigger_manual_scan(&h.root.join("Show"))
        .await
        .unwrap();
    // Overlaps the first job, so it waits for its slot
    let second = h.scheduler.trigger_manual_scan(&h.root).await.unwrap();

    assert_eq!(first.wait().await, JobStatus::Failed);
    let summary = h.summary_for(first.id).await;
    assert!(summary.failed);
    assert!(summary.error.as_deref().unwrap().contains("worker crashed"));

    assert_eq!(second.wait().await, JobStatus::Completed);
    let summary = h.summary_for(second.id).await;
    assert!(!summary.failed);
    assert_eq!(summary.counts.added, 1);
    assert!(h.scheduler.jobs().iter().all(|j| j.status != JobStatus::Running));
}

#[tokio::test]
async fn cancelling_running_job_keeps_checked_files_only() {
    let prober = Arc::new(SlowProber::new(Duration::from_millis(300)));
    let h = TestHarness::with_prober(prober, |c| {
        c.scan.max_workers = 1;
        c.scan.intra_job_fanout = 1;
    });
    for i in 0..5 {
        h.write(&format!("Show/e{}.mkv", i), &mkv_bytes());
    }

    let handle = h
        .scheduler
        .trigger_manual_scan(&h.root.join("Show"))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !h
            .scheduler
            .jobs()
            .iter()
            .any(|j| j.id == handle.id && j.status == JobStatus::Running)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job never started");
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert_eq!(h.scheduler.cancel_job(handle.id).unwrap(), JobStatus::Running);
    assert_eq!(handle.wait().await, JobStatus::Cancelled);

    let summary = h.summary_for(handle.id).await;
    assert_eq!(summary.status, JobStatus::Cancelled);
    assert!(summary.counts.added >= 1);
    assert!(summary.counts.added < 5);
    assert_eq!(summary.counts.removed, 0);
    assert_eq!(h.scheduler.health_counts().total, summary.counts.added as usize);
}

#[tokio::test]
async fn overlapping_jobs_never_run_together() {
    let prober = Arc::new(SlowProber::new(Duration::from_millis(100)));
    let h = TestHarness::with_prober(prober, |c| c.scan.max_workers = 4);
    h.write("Show/Season 1/e1.mkv", &mkv_bytes());
    h.write("Show/Season 1/e2.mkv", &mkv_bytes());
    h.write("Show/e0.mkv", &mkv_bytes());
    h.write("Movies/Foo/foo.mkv", &mkv_bytes());

    let mut events = h.scheduler.state().subscribe();
    let targets = [
        h.root.join("Show/Season 1"),
        h.root.join("Movies/Foo"),
        h.root.join("Show"),
        h.root.clone(),
        h.root.join("Show/Season 1"),
    ];
    for target in &targets {
        h.scheduler.trigger_manual_scan(target).await.unwrap();
    }

    let mut active: HashMap<JobId, PathBuf> = HashMap::new();
    let mut finished = 0;
    let mut max_active = 0;
    tokio::time::timeout(Duration::from_secs(20), async {
        while finished < targets.len() {
            match events.recv().await.unwrap() {
                AppEvent::JobStarted { job } => {
                    for (id, running) in &active {
                        assert!(
                            !subtrees_overlap(running, &job.target),
                            "{} started while job {} on {} was running",
                            job.target.display(),
                            id,
                            running.display()
                        );
                    }
                    active.insert(job.id, job.target);
                    max_active = max_active.max(active.len());
                }
                AppEvent::JobFinished { job_id, status, .. } => {
                    assert_eq!(status, JobStatus::Completed);
                    active.remove(&job_id);
                    finished += 1;
                }
                _ => {}
            }
        }
    })
    .await
    .expect("jobs did not finish");

    // The disjoint movie job ran alongside the season job
    assert!(max_active >= 2);
}

// ---------------------------------------------------------------------------
// Scheduled full scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_scan_covers_every_root() {
    let h = TestHarness::new();
    h.write("Show/e1.mkv", &mkv_bytes());
    h.write("Movies/Foo/foo.mkv", &mkv_bytes());

    let handles = h.scheduler.trigger_full_scan().await.unwrap();
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].target, h.root);
    assert_eq!(handles[0].wait().await, JobStatus::Completed);

    let summary = h.summary_for(handles[0].id).await;
    assert_eq!(summary.reason, TriggerReason::Scheduled);
    assert_eq!(summary.counts.added, 2);
}

#[tokio::test]
async fn full_scan_skips_root_still_in_progress() {
    let prober = Arc::new(SlowProber::new(Duration::from_millis(300)));
    let h = TestHarness::with_prober(prober, |_| {});
    h.write("Show/e1.mkv", &mkv_bytes());

    let first = h.scheduler.trigger_full_scan().await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(h.scheduler.trigger_full_scan().await.unwrap().is_empty());

    first[0].wait().await;
    let again = h.scheduler.trigger_full_scan().await.unwrap();
    assert_eq!(again.len(), 1);
    again[0].wait().await;
}

#[tokio::test]
async fn startup_scan_runs_when_enabled() {
    let h = TestHarness::with_config(|c| {
        c.schedule.run_on_startup = true;
        c.schedule.interval_hours = 0;
    });
    h.write("Show/e1.mkv", &mkv_bytes());

    let shutdown = CancellationToken::new();
    let task = periodic::spawn(Arc::clone(&h.scheduler), shutdown.clone());

    let summary = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(s) = h.scheduler.history(None).into_iter().next() {
                return s;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("startup scan never finished");
    assert_eq!(summary.reason, TriggerReason::Scheduled);
    assert_eq!(summary.counts.added, 1);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn startup_scan_can_be_disabled() {
    let h = TestHarness::with_config(|c| c.schedule.run_on_startup = false);
    h.write("Show/e1.mkv", &mkv_bytes());

    let shutdown = CancellationToken::new();
    let task = periodic::spawn(Arc::clone(&h.scheduler), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(h.scheduler.jobs().is_empty());
    shutdown.cancel();
    task.await.unwrap();
}
