//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temporary library root, an
//! in-memory DB and a running [`Scheduler`]. The [`TestHarness::with_server`]
//! constructor starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use omniscan::config::persist::save_config;
use omniscan::config::{Config, RootConfig};
use omniscan::notifications::NotificationManager;
use omniscan::scheduler::{Scheduler, SchedulerOptions};
use omniscan::server::{create_router, AppContext};
use omniscan::verify::Prober;
use omniscan_common::{JobId, Result, ScanSessionSummary};
use omniscan_db::pool::{init_memory_pool, DbPool};
use omniscan_probe::StreamInfo;
use tempfile::TempDir;

/// Prober that accepts every file.
pub struct AcceptAll;

impl Prober for AcceptAll {
    fn name(&self) -> &'static str {
        "accept-all"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn probe(&self, _path: &Path) -> Result<StreamInfo> {
        Ok(StreamInfo {
            format: "test".into(),
            duration_ms: Some(1_000),
            tracks: vec![],
        })
    }
}

/// Prober that takes `delay` per file and panics on its first call when
/// `panic_once` is set.
pub struct SlowProber {
    pub delay: Duration,
    pub panic_once: AtomicBool,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            panic_once: AtomicBool::new(false),
        }
    }

    pub fn panicking(delay: Duration) -> Self {
        Self {
            delay,
            panic_once: AtomicBool::new(true),
        }
    }
}

impl Prober for SlowProber {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo> {
        std::thread::sleep(self.delay);
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("decoder blew up on {}", path.display());
        }
        AcceptAll.probe(path)
    }
}

/// A minimal well-formed Matroska header with a complete Segment.
pub fn mkv_bytes() -> Vec<u8> {
    let mut data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x80];
    data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x80 | 20]);
    data.extend(std::iter::repeat(0u8).take(20));
    data
}

/// Matroska header whose Segment claims more bytes than the file holds.
pub fn truncated_mkv_bytes() -> Vec<u8> {
    let mut data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x80];
    data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x80 | 100]);
    data.extend(std::iter::repeat(0u8).take(10));
    data
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.roots = vec![RootConfig::new(root)];
    config.watch.enabled = false;
    config.scan.debounce_secs = 1;
    config
}

pub struct TestHarness {
    pub scheduler: Arc<Scheduler>,
    pub db: DbPool,
    /// Canonical library root
    pub root: PathBuf,
    /// Set when started through [`TestHarness::with_config_file`]
    pub config_path: Option<PathBuf>,
    _dir: TempDir,
    _config_dir: Option<TempDir>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness whose default config is adjusted by `tweak` before start.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(tweak, false, Arc::new(AcceptAll))
    }

    /// Harness whose verifier checks files through `prober`.
    pub fn with_prober(prober: Arc<dyn Prober>, tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(tweak, false, prober)
    }

    /// Harness whose config is also written to a TOML file the scheduler
    /// reloads from and persists to.
    pub fn with_config_file(tweak: impl FnOnce(&mut Config)) -> Self {
        Self::build(tweak, true, Arc::new(AcceptAll))
    }

    fn build(tweak: impl FnOnce(&mut Config), with_file: bool, prober: Arc<dyn Prober>) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path().canonicalize().expect("failed to canonicalize");
        let mut config = test_config(&root);
        tweak(&mut config);

        let (config_dir, config_path) = if with_file {
            let config_dir = tempfile::tempdir().expect("failed to create config dir");
            let path = config_dir.path().join("config.toml");
            save_config(&path, &config).expect("failed to write config");
            (Some(config_dir), Some(path))
        } else {
            (None, None)
        };

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let scheduler = Scheduler::start(
            config,
            SchedulerOptions {
                db: Some(db.clone()),
                prober: Some(prober),
                notifications: Some(Arc::new(NotificationManager::with_targets(
                    vec![],
                    vec![],
                ))),
                config_path: config_path.clone(),
            },
        )
        .expect("failed to start scheduler");

        Self {
            scheduler,
            db,
            root,
            config_path,
            _dir: dir,
            _config_dir: config_dir,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(|_| {}).await
    }

    pub async fn with_server_config(tweak: impl FnOnce(&mut Config)) -> (Self, SocketAddr) {
        Self::serve(Self::with_config(tweak)).await
    }

    pub async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = create_router(AppContext::new(Arc::clone(&harness.scheduler)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Create a file under the root, making parent directories.
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent");
        }
        std::fs::write(&path, contents).expect("failed to write file");
        path
    }

    pub fn mkdir(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    /// Wait until the summary for `job_id` shows up in history.
    pub async fn summary_for(&self, job_id: JobId) -> ScanSessionSummary {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(summary) = self
                    .scheduler
                    .history(None)
                    .into_iter()
                    .find(|s| s.job_id == job_id)
                {
                    return summary;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timed out waiting for session summary")
    }
}
