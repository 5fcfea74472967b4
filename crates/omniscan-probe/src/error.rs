//! Error types for omniscan-probe

use std::path::PathBuf;

/// Errors that can occur while probing a media file
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported container format
    #[error("Unsupported container format: {0}")]
    UnsupportedContainer(String),

    /// Failed to parse container
    #[error("Failed to parse container: {0}")]
    ContainerParse(String),

    /// Container parsed but declares no tracks
    #[error("No tracks found in file")]
    NoTracks,
}
