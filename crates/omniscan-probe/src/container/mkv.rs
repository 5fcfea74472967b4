//! Matroska (MKV/WebM) container parsing

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use matroska::Matroska;

use super::EBML_MAGIC;
use crate::error::ProbeError;
use crate::types::{Integrity, StreamInfo, TrackInfo, TrackKind};

const SEGMENT_ID: [u8; 4] = [0x18, 0x53, 0x80, 0x67];
const VOID_ID: u8 = 0xEC;

/// An EBML variable-length integer.
struct Vint {
    value: u64,
    len: u64,
    unknown: bool,
}

/// Read a size vint. `None` at end of stream.
fn read_vint<R: Read>(reader: &mut R) -> Result<Option<Vint>, ProbeError> {
    let mut first = [0u8; 1];
    if reader.read(&mut first)? == 0 {
        return Ok(None);
    }
    let lead = first[0];
    if lead == 0 {
        return Err(ProbeError::ContainerParse(
            "invalid EBML size marker".to_string(),
        ));
    }

    // len is 1..=8; the widened shift keeps an 8-byte marker from overflowing
    let len = lead.leading_zeros() as u64 + 1;
    let mut value = (lead as u16 & (0xFFu16 >> len)) as u64;
    for _ in 1..len {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            return Ok(None);
        }
        value = (value << 8) | byte[0] as u64;
    }

    let all_ones = (1u64 << (7 * len)) - 1;
    Ok(Some(Vint {
        value,
        len,
        unknown: value == all_ones,
    }))
}

/// Check that the EBML header and Segment element fit inside `file_len`.
pub fn check_structure<R: Read + Seek>(
    reader: &mut R,
    file_len: u64,
) -> Result<Integrity, ProbeError> {
    reader.seek(SeekFrom::Start(0))?;

    let mut magic = [0u8; 4];
    if reader.read(&mut magic)? < 4 || magic != EBML_MAGIC {
        return Ok(Integrity::truncated("missing EBML header"));
    }

    let Some(header_size) = read_vint(reader)? else {
        return Ok(Integrity::truncated("EBML header cut short"));
    };
    let mut offset = 4 + header_size.len + header_size.value;
    if offset > file_len {
        return Ok(Integrity::truncated("EBML header extends past end of file"));
    }

    // Void elements may pad between the header and the segment
    loop {
        reader.seek(SeekFrom::Start(offset))?;
        let mut id = [0u8; 4];
        let n = reader.read(&mut id[..1])?;
        if n == 0 {
            return Ok(Integrity::truncated("no Segment element"));
        }

        if id[0] == VOID_ID {
            let Some(size) = read_vint(reader)? else {
                return Ok(Integrity::truncated("void element cut short"));
            };
            offset += 1 + size.len + size.value;
            continue;
        }

        if reader.read(&mut id[1..])? < 3 {
            return Ok(Integrity::truncated("Segment element cut short"));
        }
        if id != SEGMENT_ID {
            return Ok(Integrity::truncated(format!(
                "unexpected top-level element {:02X?} at offset {}",
                id, offset
            )));
        }

        let Some(size) = read_vint(reader)? else {
            return Ok(Integrity::truncated("Segment size cut short"));
        };
        if size.unknown {
            return Ok(Integrity::Intact);
        }

        let data_start = offset + 4 + size.len;
        let declared_end = data_start.saturating_add(size.value);
        if declared_end > file_len {
            return Ok(Integrity::truncated(format!(
                "Segment declares {} bytes but only {} present",
                size.value,
                file_len.saturating_sub(data_start)
            )));
        }
        return Ok(Integrity::Intact);
    }
}

/// Probe a Matroska file for its tracks
pub fn probe(path: &Path) -> Result<StreamInfo, ProbeError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mkv = Matroska::open(reader)
        .map_err(|e| ProbeError::ContainerParse(format!("MKV parse error: {}", e)))?;

    let tracks = mkv
        .tracks
        .iter()
        .enumerate()
        .map(|(idx, track)| TrackInfo {
            index: idx as u32,
            kind: match track.tracktype {
                matroska::Tracktype::Video => TrackKind::Video,
                matroska::Tracktype::Audio => TrackKind::Audio,
                matroska::Tracktype::Subtitle => TrackKind::Subtitle,
                _ => TrackKind::Other,
            },
            codec: codec_id_to_name(&track.codec_id),
        })
        .collect();

    Ok(StreamInfo {
        format: "Matroska".to_string(),
        duration_ms: mkv.info.duration.map(|d| d.as_millis() as u64),
        tracks,
    })
}

/// Convert MKV codec ID to human-readable name
fn codec_id_to_name(codec_id: &str) -> String {
    match codec_id {
        "V_MPEG4/ISO/AVC" => "AVC".to_string(),
        "V_MPEGH/ISO/HEVC" => "HEVC".to_string(),
        "V_AV1" => "AV1".to_string(),
        "V_VP8" => "VP8".to_string(),
        "V_VP9" => "VP9".to_string(),
        "V_MPEG2" => "MPEG-2".to_string(),
        "A_AAC" | "A_AAC/MPEG2/LC" | "A_AAC/MPEG4/LC" | "A_AAC/MPEG4/LC/SBR" => "AAC".to_string(),
        "A_AC3" => "AC-3".to_string(),
        "A_EAC3" => "E-AC-3".to_string(),
        "A_DTS" => "DTS".to_string(),
        "A_TRUEHD" => "TrueHD".to_string(),
        "A_FLAC" => "FLAC".to_string(),
        "A_OPUS" => "Opus".to_string(),
        "S_TEXT/UTF8" => "SRT".to_string(),
        "S_TEXT/ASS" | "S_TEXT/SSA" => "ASS".to_string(),
        "S_HDMV/PGS" => "PGS".to_string(),
        other => other
            .strip_prefix("V_")
            .or_else(|| other.strip_prefix("A_"))
            .or_else(|| other.strip_prefix("S_"))
            .unwrap_or(other)
            .to_string(),
    }
}
