//! Container format detection and parsing

pub mod mkv;
pub mod mp4;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::error::ProbeError;

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Matroska (.mkv, .webm)
    Matroska,
    /// MPEG-4 Part 14 (.mp4, .m4v, .mov)
    Mp4,
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Container::Matroska => write!(f, "Matroska"),
            Container::Mp4 => write!(f, "MP4"),
        }
    }
}

pub(crate) const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Box types that may open an MP4 or QuickTime file. `ftyp` normally leads;
/// older QuickTime writers start with padding or a preview atom.
const LEADING_ATOMS: [&[u8]; 7] = [b"ftyp", b"moov", b"mdat", b"free", b"wide", b"skip", b"pnot"];

/// Detect container format from file magic bytes
pub fn detect_container(path: &Path) -> Result<Option<Container>, ProbeError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FileNotFound(path.to_path_buf())
        } else {
            ProbeError::Io(e)
        }
    })?;

    let mut reader = BufReader::new(file);
    detect_container_from_reader(&mut reader)
}

/// Detect container format from a reader.
///
/// Returns `None` when the first bytes match no known envelope, including
/// when the stream is shorter than a magic header.
pub fn detect_container_from_reader<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<Container>, ProbeError> {
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        let n = reader.read(&mut magic[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.rewind()?;

    if filled >= 4 && magic[0..4] == EBML_MAGIC {
        return Ok(Some(Container::Matroska));
    }

    if filled == magic.len() && LEADING_ATOMS.contains(&&magic[4..8]) {
        return Ok(Some(Container::Mp4));
    }

    Ok(None)
}

/// Get container type from file extension
pub fn container_from_extension(path: &Path) -> Option<Container> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "mkv" | "webm" | "mka" | "mk3d" => Some(Container::Matroska),
        "mp4" | "m4v" | "m4a" | "m4p" | "m4b" | "m4r" | "mov" | "3gp" | "3g2" => {
            Some(Container::Mp4)
        }
        _ => None,
    }
}
