//! # omniscan-probe
//!
//! Pure Rust integrity checks and stream probing for media files.
//!
//! ## Features
//!
//! - Structural checks: Matroska Segment size, MP4 top-level box walk
//! - Sampled reads at the tail and at random offsets
//! - Content fingerprints for cheap change detection
//! - Track listing via `matroska` and `mp4parse`
//!
//! ## Example
//!
//! ```no_run
//! use omniscan_probe::{check_integrity, probe_streams, Integrity};
//!
//! match check_integrity("movie.mkv").unwrap() {
//!     Integrity::Intact => {
//!         let info = probe_streams("movie.mkv").unwrap();
//!         println!("{}: {} tracks", info.format, info.tracks.len());
//!     }
//!     Integrity::Truncated(reason) => println!("truncated: {}", reason),
//! }
//! ```

pub mod container;
pub mod error;
pub mod sample;
pub mod types;

pub use error::ProbeError;
pub use sample::fingerprint;
pub use types::*;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use container::Container;

/// Check a file's container envelope and sampled reads.
///
/// Returns `Ok(Integrity::Truncated(..))` when the content is short or
/// inconsistent, and `Err` only when the file cannot be opened or read at all.
pub fn check_integrity<P: AsRef<Path>>(path: P) -> Result<Integrity, ProbeError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FileNotFound(path.to_path_buf())
        } else {
            ProbeError::Io(e)
        }
    })?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let detected = container::detect_container_from_reader(&mut reader)?;
    let expected = container::container_from_extension(path);

    let envelope = match (detected, expected) {
        (Some(Container::Matroska), _) => container::mkv::check_structure(&mut reader, file_len)?,
        (Some(Container::Mp4), _) => container::mp4::check_structure(&mut reader, file_len)?,
        (None, Some(container)) => Integrity::Truncated(format!(
            "missing {} container header",
            container
        )),
        (None, None) => Integrity::Intact,
    };
    if !envelope.is_intact() {
        return Ok(envelope);
    }

    sample::check_samples(&mut reader, file_len, &mut rand::thread_rng())
}

/// List the tracks of a Matroska or MP4 file.
///
/// Fails with [`ProbeError::NoTracks`] when the container parses but declares
/// no tracks.
pub fn probe_streams<P: AsRef<Path>>(path: P) -> Result<StreamInfo, ProbeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ProbeError::FileNotFound(path.to_path_buf()));
    }

    let container = container::detect_container(path)?
        .or_else(|| container::container_from_extension(path))
        .ok_or_else(|| ProbeError::UnsupportedContainer("Unknown".to_string()))?;

    let info = match container {
        Container::Matroska => container::mkv::probe(path)?,
        Container::Mp4 => container::mp4::probe(path)?,
    };

    if info.tracks.is_empty() {
        return Err(ProbeError::NoTracks);
    }
    Ok(info)
}

/// Whether stream probing understands this file's extension.
pub fn is_supported_extension<P: AsRef<Path>>(path: P) -> bool {
    container::container_from_extension(path.as_ref()).is_some()
}
