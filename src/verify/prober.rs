//! Metadata probers used after the structural check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use omniscan_common::{Error, Result};
use omniscan_probe::{StreamInfo, TrackInfo, TrackKind};
use serde::Deserialize;
use tokio::process::Command;

/// A media file prober that proves the file is decodable enough to list.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
/// `probe` is blocking and runs on the blocking pool.
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Check whether this prober supports the given file path.
    fn supports(&self, path: &Path) -> bool;

    /// Probe the file. An `Err` means the file is unreadable.
    fn probe(&self, path: &Path) -> Result<StreamInfo>;
}

/// Pure Rust prober for Matroska and MP4 containers.
#[derive(Debug, Clone, Default)]
pub struct RustProber;

impl RustProber {
    pub fn new() -> Self {
        Self
    }
}

impl Prober for RustProber {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn supports(&self, path: &Path) -> bool {
        omniscan_probe::is_supported_extension(path)
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo> {
        omniscan_probe::probe_streams(path).map_err(|e| Error::probe(e.to_string()))
    }
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf, timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            timeout,
        }
    }

    /// Create a prober that finds ffprobe on `PATH`.
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("ffprobe").ok().map(|p| Self::new(p, timeout))
    }

    async fn probe_async(&self, path: &Path) -> Result<StreamInfo> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=format_name,duration:stream=index,codec_type,codec_name",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| Error::probe(format!("failed to run ffprobe: {}", e)))?,
            Err(_) => return Err(Error::ProbeTimeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::probe(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_ffprobe_output(&output.stdout)
    }
}

impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn supports(&self, path: &Path) -> bool {
        // ffprobe supports basically all media formats.
        path.extension().is_some()
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(self.probe_async(path)),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| Error::internal(format!("failed to create tokio runtime: {}", e)))?;
                rt.block_on(self.probe_async(path))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
}

fn parse_ffprobe_output(stdout: &[u8]) -> Result<StreamInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| Error::probe(format!("unparseable ffprobe output: {}", e)))?;

    let format = parsed
        .format
        .ok_or_else(|| Error::probe("ffprobe reported no format"))?;
    let seconds: f64 = format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse().ok())
        .ok_or_else(|| Error::probe("ffprobe reported no duration"))?;

    let tracks = parsed
        .streams
        .into_iter()
        .map(|s| TrackInfo {
            index: s.index,
            kind: match s.codec_type.as_deref() {
                Some("video") => TrackKind::Video,
                Some("audio") => TrackKind::Audio,
                Some("subtitle") => TrackKind::Subtitle,
                _ => TrackKind::Other,
            },
            codec: s.codec_name.unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();

    Ok(StreamInfo {
        format: format.format_name.unwrap_or_else(|| "unknown".to_string()),
        duration_ms: Some((seconds * 1000.0) as u64),
        tracks,
    })
}

/// Tries each registered [`Prober`] in order and returns the first successful result.
pub struct CompositeProber {
    probers: Vec<Box<dyn Prober>>,
}

impl CompositeProber {
    pub fn new(probers: Vec<Box<dyn Prober>>) -> Self {
        Self { probers }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.probers.iter().map(|p| p.name()).collect()
    }
}

impl Prober for CompositeProber {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn supports(&self, path: &Path) -> bool {
        self.probers.iter().any(|p| p.supports(path))
    }

    fn probe(&self, path: &Path) -> Result<StreamInfo> {
        let mut last_err = None;

        for prober in &self.probers {
            if !prober.supports(path) {
                continue;
            }

            match prober.probe(path) {
                Ok(info) => return Ok(info),
                Err(e) => {
                    tracing::debug!(
                        prober = prober.name(),
                        path = %path.display(),
                        error = %e,
                        "prober failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::probe(format!("no prober supports file: {}", path.display()))
        }))
    }
}

/// Rust prober first, ffprobe as fallback when it is installed.
pub fn default_prober(timeout: Duration) -> CompositeProber {
    let mut probers: Vec<Box<dyn Prober>> = vec![Box::new(RustProber::new())];
    match FfprobeProber::from_path(timeout) {
        Some(ffprobe) => probers.push(Box::new(ffprobe)),
        None => tracing::debug!("ffprobe not found on PATH, using the built-in prober only"),
    }
    CompositeProber::new(probers)
}
