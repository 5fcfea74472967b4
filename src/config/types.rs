use omniscan_common::paths::default_media_extensions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub roots: Vec<RootConfig>,

    #[serde(default)]
    pub media_servers: Vec<MediaServerConfig>,

    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn enabled_roots(&self) -> impl Iterator<Item = &RootConfig> {
        self.roots.iter().filter(|r| r.enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub webhook_security: WebhookSecurityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WebhookSecurityConfig {
    /// Enable webhook signature verification
    #[serde(default)]
    pub signature_verification: bool,

    /// Shared secret for HMAC-SHA256 signature verification
    #[serde(default)]
    pub signature_secret: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_security: WebhookSecurityConfig::default(),
        }
    }
}

/// Scheduler and verification tunables.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Quiet interval before a directory's bucket fires
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,

    /// Concurrent scan jobs, and the shared probe permit pool
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Concurrent file checks within one job
    #[serde(default = "default_intra_job_fanout")]
    pub intra_job_fanout: usize,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Group events under the ancestor this many components below the root
    #[serde(default)]
    pub rollup_depth: Option<usize>,

    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,

    /// Glob patterns (`*`, `?`, `**`) matched against the full path or the
    /// file name
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Record broken symlinks as corrupt-unreadable instead of skipping them
    #[serde(default = "default_true")]
    pub symlink_check: bool,

    /// Log rescans and notifications instead of sending them
    #[serde(default)]
    pub dry_run: bool,

    /// A corrupt file becoming healthy also triggers a rescan
    #[serde(default = "default_true")]
    pub rescan_on_restored: bool,

    #[serde(default = "default_deletion_threshold")]
    pub deletion_threshold: usize,

    #[serde(default = "default_true")]
    pub abort_on_mass_deletion: bool,

    /// Record files shorter than `min_duration_secs` as ignored samples
    #[serde(default)]
    pub ignore_samples: bool,

    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: u64,
}

fn default_debounce_secs() -> u64 {
    10
}
fn default_max_workers() -> usize {
    4
}
fn default_intra_job_fanout() -> usize {
    2
}
fn default_probe_timeout_secs() -> u64 {
    60
}
fn default_deletion_threshold() -> usize {
    50
}
fn default_min_duration_secs() -> u64 {
    180
}
fn default_true() -> bool {
    true
}

impl ScanConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Shortest duration a file may have before it counts as a sample.
    pub fn min_duration(&self) -> Option<Duration> {
        self.ignore_samples
            .then(|| Duration::from_secs(self.min_duration_secs))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            max_workers: default_max_workers(),
            intra_job_fanout: default_intra_job_fanout(),
            probe_timeout_secs: default_probe_timeout_secs(),
            rollup_depth: None,
            media_extensions: default_media_extensions(),
            ignore_patterns: Vec::new(),
            symlink_check: true,
            dry_run: false,
            rescan_on_restored: true,
            deletion_threshold: default_deletion_threshold(),
            abort_on_mass_deletion: true,
            ignore_samples: false,
            min_duration_secs: default_min_duration_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Full scans of every root, independent of change events.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Scan every root once at startup
    #[serde(default = "default_true")]
    pub run_on_startup: bool,

    /// Hours between scheduled scans; 0 disables them
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Local "HH:MM" the daily slots are anchored to
    #[serde(default)]
    pub start_time: Option<String>,
}

fn default_interval_hours() -> u64 {
    24
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_on_startup: true,
            interval_hours: default_interval_hours(),
            start_time: None,
        }
    }
}

/// A watched library root.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RootConfig {
    pub path: PathBuf,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub recursive: bool,
}

impl RootConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MediaServerConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: MediaServerKind,

    pub url: String,

    pub api_key: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Plex library section to refresh
    #[serde(default)]
    pub section_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaServerKind {
    Jellyfin,
    Emby,
    Plex,
}

/// Receives every gated session summary as a JSON POST.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NotifierConfig {
    pub name: String,

    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding `omniscan.db`; defaults to the config file's directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Session summaries kept in memory and in the database
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_limit: default_history_limit(),
        }
    }
}
