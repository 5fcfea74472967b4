//! Startup and interval full scans.
//!
//! Runs beside the event-driven path: every root is scanned once at startup
//! (when enabled) and then every `interval_hours`, optionally anchored to a
//! local `start_time`. The schedule is re-read when the configuration is
//! reloaded.

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::Scheduler;
use crate::config::{parse_start_time, ScheduleConfig};
use crate::state::AppEvent;

/// When the next scheduled scan is due after `now`, or `None` when interval
/// scans are disabled.
///
/// Without a start time the next run is one interval away. With one, the
/// runs fall on the daily slots `start_time + k * interval_hours` that fit in
/// a day, so a 6 hour interval anchored at 03:00 runs at 03:00, 09:00, 15:00
/// and 21:00.
pub fn next_run(now: NaiveDateTime, schedule: &ScheduleConfig) -> Option<NaiveDateTime> {
    if schedule.interval_hours == 0 {
        return None;
    }
    let interval = ChronoDuration::hours(schedule.interval_hours as i64);

    let start = match schedule.start_time.as_deref().map(parse_start_time) {
        None => return Some(now + interval),
        Some(Ok(start)) => start,
        Some(Err(e)) => {
            tracing::warn!("Ignoring schedule start time: {:#}", e);
            return Some(now + interval);
        }
    };

    let slots_per_day = (24 / schedule.interval_hours).max(1) as i32;
    // Yesterday's anchor covers slots that wrap past midnight
    [-1i64, 0, 1]
        .into_iter()
        .filter_map(|offset| now.date().checked_add_signed(ChronoDuration::days(offset)))
        .flat_map(|day| {
            let anchor = day.and_time(start);
            (0..slots_per_day).map(move |k| anchor + interval * k)
        })
        .filter(|slot| *slot > now)
        .min()
}

fn next_deadline(schedule: &ScheduleConfig) -> Option<Instant> {
    let now = Local::now().naive_local();
    let next = next_run(now, schedule)?;
    let wait = (next - now).to_std().ok()?;
    tracing::info!(next = %next.format("%Y-%m-%d %H:%M"), "next scheduled scan");
    Some(Instant::now() + wait)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_full_scan(scheduler: &Scheduler) {
    match scheduler.trigger_full_scan().await {
        Ok(handles) => tracing::debug!(jobs = handles.len(), "full scan submitted"),
        Err(e) => tracing::warn!("Scheduled scan not started: {}", e),
    }
}

/// Spawn the schedule task. It stops when `shutdown` fires.
pub fn spawn(scheduler: Arc<Scheduler>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = scheduler.state().subscribe();
        let mut schedule = scheduler.config().schedule;

        if schedule.run_on_startup {
            tracing::info!("running startup scan");
            run_full_scan(&scheduler).await;
        }

        let mut deadline = next_deadline(&schedule);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = sleep_until(deadline) => {
                    tracing::info!("running scheduled scan");
                    run_full_scan(&scheduler).await;
                    deadline = next_deadline(&schedule);
                }

                event = events.recv() => match event {
                    Ok(AppEvent::ConfigReloaded { .. })
                    | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let current = scheduler.config().schedule;
                        if current != schedule {
                            schedule = current;
                            deadline = next_deadline(&schedule);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::info!("scan schedule stopped");
    })
}
