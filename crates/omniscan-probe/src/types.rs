//! Core types for probe results

use std::fmt;

/// Outcome of a structural integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Integrity {
    /// Envelope and sampled reads are consistent with the file size.
    Intact,
    /// The file is shorter than its container declares, or a sampled read
    /// came back empty.
    Truncated(String),
}

impl Integrity {
    pub fn is_intact(&self) -> bool {
        matches!(self, Integrity::Intact)
    }

    pub(crate) fn truncated<S: Into<String>>(reason: S) -> Self {
        Integrity::Truncated(reason.into())
    }
}

/// Stream-level information extracted from a container
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Container or format name (e.g., "Matroska", "MP4")
    pub format: String,
    /// Duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Tracks in container order
    pub tracks: Vec<TrackInfo>,
}

impl StreamInfo {
    pub fn count(&self, kind: TrackKind) -> usize {
        self.tracks.iter().filter(|t| t.kind == kind).count()
    }
}

/// One track inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track index (0-based)
    pub index: u32,
    pub kind: TrackKind,
    /// Codec name (e.g., "HEVC", "AAC")
    pub codec: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Subtitle => write!(f, "subtitle"),
            TrackKind::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_counts() {
        let info = StreamInfo {
            format: "Matroska".into(),
            duration_ms: Some(1000),
            tracks: vec![
                TrackInfo {
                    index: 0,
                    kind: TrackKind::Video,
                    codec: "HEVC".into(),
                },
                TrackInfo {
                    index: 1,
                    kind: TrackKind::Audio,
                    codec: "AAC".into(),
                },
                TrackInfo {
                    index: 2,
                    kind: TrackKind::Audio,
                    codec: "AC-3".into(),
                },
            ],
        };
        assert_eq!(info.count(TrackKind::Video), 1);
        assert_eq!(info.count(TrackKind::Audio), 2);
        assert_eq!(info.count(TrackKind::Subtitle), 0);
    }

    #[test]
    fn test_integrity() {
        assert!(Integrity::Intact.is_intact());
        assert!(!Integrity::truncated("short").is_intact());
    }
}
