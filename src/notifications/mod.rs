//! Media server rescan triggers and summary notifiers.

pub mod jellyfin;
pub mod plex;
pub mod webhook;

pub use jellyfin::JellyfinClient;
pub use plex::PlexClient;
pub use webhook::WebhookNotifier;

use crate::config::{Config, MediaServerKind};
use crate::metrics;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use omniscan_common::ScanSessionSummary;
use parking_lot::RwLock;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks a media server to rescan one directory.
#[async_trait]
pub trait RescanTrigger: Send + Sync {
    fn name(&self) -> &str;

    async fn trigger_media_server_rescan(&self, directory: &Path) -> Result<()>;
}

/// Receives a finished session summary.
#[async_trait]
pub trait SummaryNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, summary: &ScanSessionSummary) -> Result<()>;
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(CONNECTION_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client: {}", e);
            Client::new()
        })
}

/// Outcome of one delivery round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Targets {
    triggers: Vec<Arc<dyn RescanTrigger>>,
    notifiers: Vec<Arc<dyn SummaryNotifier>>,
}

/// Manages all notification targets (media servers and summary notifiers).
pub struct NotificationManager {
    targets: RwLock<Arc<Targets>>,
}

impl NotificationManager {
    pub fn new(config: &Config) -> Self {
        Self {
            targets: RwLock::new(Arc::new(build_targets(config))),
        }
    }

    /// Manager over explicit targets.
    pub fn with_targets(
        triggers: Vec<Arc<dyn RescanTrigger>>,
        notifiers: Vec<Arc<dyn SummaryNotifier>>,
    ) -> Self {
        Self {
            targets: RwLock::new(Arc::new(Targets {
                triggers,
                notifiers,
            })),
        }
    }

    /// Rebuild targets from a new configuration.
    pub fn reload(&self, config: &Config) {
        *self.targets.write() = Arc::new(build_targets(config));
    }

    /// Check if there are any enabled notification targets
    pub fn has_targets(&self) -> bool {
        let targets = self.targets.read();
        !targets.triggers.is_empty() || !targets.notifiers.is_empty()
    }

    /// Trigger every media server for the summary's directory and send the
    /// summary to every notifier, concurrently. Errors are logged, never
    /// propagated.
    pub async fn deliver(&self, summary: &ScanSessionSummary) -> Delivery {
        let targets = Arc::clone(&self.targets.read());
        let directory = summary.directory.as_path();

        let rescans = targets.triggers.iter().map(|trigger| async move {
            let name = trigger.name().to_string();
            let result = bounded(trigger.trigger_media_server_rescan(directory)).await;
            match &result {
                Ok(()) => {
                    metrics::rescan_triggered();
                    tracing::info!(
                        server = %name,
                        directory = %directory.display(),
                        "media server rescan triggered"
                    )
                }
                Err(e) => tracing::warn!(server = %name, "Failed to trigger rescan: {}", e),
            }
            result.is_ok()
        });

        let notifies = targets.notifiers.iter().map(|notifier| async move {
            let name = notifier.name().to_string();
            let result = bounded(notifier.notify(summary)).await;
            match &result {
                Ok(()) => tracing::debug!(notifier = %name, session_id = %summary.id, "summary delivered"),
                Err(e) => tracing::warn!(notifier = %name, "Failed to deliver summary: {}", e),
            }
            result.is_ok()
        });

        let (rescans, notifies) = tokio::join!(join_all(rescans), join_all(notifies));

        let mut delivery = Delivery::default();
        for ok in rescans.into_iter().chain(notifies) {
            if ok {
                delivery.succeeded += 1;
            } else {
                delivery.failed += 1;
            }
        }
        delivery
    }

    /// Fire-and-forget delivery.
    pub fn spawn_delivery(self: &Arc<Self>, summary: ScanSessionSummary) -> tokio::task::JoinHandle<Delivery> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.deliver(&summary).await })
    }
}

async fn bounded(fut: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    match tokio::time::timeout(CONNECTION_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("timed out after {}s", CONNECTION_TIMEOUT.as_secs()),
    }
}

fn build_targets(config: &Config) -> Targets {
    let mut targets = Targets::default();

    for server in config.media_servers.iter().filter(|s| s.enabled) {
        match server.kind {
            MediaServerKind::Jellyfin | MediaServerKind::Emby => {
                targets.triggers.push(Arc::new(JellyfinClient::new(server)));
            }
            MediaServerKind::Plex => match PlexClient::new(server) {
                Ok(client) => targets.triggers.push(Arc::new(client)),
                Err(e) => tracing::warn!("Skipping media server: {}", e),
            },
        }
    }

    for notifier in config.notifiers.iter().filter(|n| n.enabled) {
        targets
            .notifiers
            .push(Arc::new(WebhookNotifier::new(notifier)));
    }

    targets
}
