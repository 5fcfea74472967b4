//! Filesystem watcher feeding raw events into the scheduler.

use crate::scheduler::Scheduler;
use crate::state::AppEvent;
use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use omniscan_common::{Error, EventKind, EventSource};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Map a notify event kind onto ours. Access events are not changes.
pub fn map_event_kind(kind: &NotifyKind) -> Option<EventKind> {
    match kind {
        NotifyKind::Create(_) => Some(EventKind::Created),
        NotifyKind::Modify(ModifyKind::Name(_)) => Some(EventKind::Renamed),
        NotifyKind::Modify(_) => Some(EventKind::Modified),
        NotifyKind::Remove(_) => Some(EventKind::Deleted),
        NotifyKind::Any | NotifyKind::Other => Some(EventKind::Unknown),
        NotifyKind::Access(_) => None,
    }
}

/// Watches every enabled root and re-syncs on configuration reloads.
pub struct FileWatcher {
    scheduler: Arc<Scheduler>,
}

impl FileWatcher {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Start watching. Runs until `shutdown` fires.
    pub fn start(self, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        // Events are ingested on the notify thread: ingestion stats the
        // filesystem and must stay off the async runtime.
        let callback_scheduler = Arc::clone(&self.scheduler);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(kind) = map_event_kind(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        ingest(&callback_scheduler, path, kind);
                    }
                }
                Err(e) => tracing::warn!("File watcher error: {}", e),
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        let mut watched = sync_watches(&mut watcher, &[], &self.scheduler);
        let mut config_rx = self.scheduler.state().subscribe();
        let scheduler = self.scheduler;

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,

                    event = config_rx.recv() => match event {
                        Ok(AppEvent::ConfigReloaded { .. }) => {
                            watched = sync_watches(&mut watcher, &watched, &scheduler);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            watched = sync_watches(&mut watcher, &watched, &scheduler);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            tracing::info!("File watcher stopped");
        }))
    }
}

fn ingest(scheduler: &Scheduler, path: PathBuf, kind: EventKind) {
    let Some(raw) = path.to_str() else {
        tracing::warn!(path = %path.display(), "skipping non UTF-8 path");
        return;
    };

    match scheduler.ingest_event(raw, EventSource::Filesystem, kind) {
        Ok(()) => {}
        Err(Error::OutOfScope(_)) => {
            tracing::trace!(path = %path.display(), "watch event outside roots");
        }
        Err(e) => tracing::debug!(path = %path.display(), "watch event rejected: {}", e),
    }
}

/// Watch the scheduler's current roots, unwatching ones that went away.
fn sync_watches(
    watcher: &mut RecommendedWatcher,
    current: &[PathBuf],
    scheduler: &Scheduler,
) -> Vec<PathBuf> {
    if !scheduler.config().watch.enabled {
        for path in current {
            let _ = watcher.unwatch(path);
        }
        if !current.is_empty() {
            tracing::info!("File watcher disabled by configuration");
        }
        return Vec::new();
    }

    let wanted = scheduler.roots();
    for path in current {
        if !wanted.iter().any(|r| &r.path == path) {
            match watcher.unwatch(path) {
                Ok(()) => tracing::info!("Stopped watching directory: {:?}", path),
                Err(e) => tracing::debug!("Failed to unwatch {:?}: {}", path, e),
            }
        }
    }

    let mut watched = Vec::new();
    for root in wanted {
        if current.contains(&root.path) {
            watched.push(root.path);
            continue;
        }
        if !root.path.exists() {
            tracing::warn!("Watch path does not exist: {:?}", root.path);
            continue;
        }
        let mode = if root.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        match watcher.watch(&root.path, mode) {
            Ok(()) => {
                tracing::info!("Watching directory: {:?}", root.path);
                watched.push(root.path);
            }
            Err(e) => tracing::warn!("Failed to watch path {:?}: {}", root.path, e),
        }
    }
    watched
}
