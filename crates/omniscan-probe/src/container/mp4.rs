//! MP4/MOV container parsing

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use mp4parse::{read_mp4, SampleEntry, TrackType};

use crate::error::ProbeError;
use crate::types::{Integrity, StreamInfo, TrackInfo, TrackKind};

/// Walk the top-level boxes. Every box must fit inside `file_len` and a
/// `moov` box must be present.
pub fn check_structure<R: Read + Seek>(
    reader: &mut R,
    file_len: u64,
) -> Result<Integrity, ProbeError> {
    let mut offset = 0u64;
    let mut saw_moov = false;

    while offset < file_len {
        if file_len - offset < 8 {
            return Ok(Integrity::truncated(format!(
                "partial box header at offset {}",
                offset
            )));
        }

        reader.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;
        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let kind = [header[4], header[5], header[6], header[7]];

        let (box_size, header_len) = match size32 {
            0 => (file_len - offset, 8),
            1 => {
                if file_len - offset < 16 {
                    return Ok(Integrity::truncated(format!(
                        "partial largesize header at offset {}",
                        offset
                    )));
                }
                let mut large = [0u8; 8];
                reader.read_exact(&mut large)?;
                (u64::from_be_bytes(large), 16)
            }
            n => (n as u64, 8),
        };

        if box_size < header_len {
            return Ok(Integrity::truncated(format!(
                "invalid size {} for box '{}' at offset {}",
                box_size,
                String::from_utf8_lossy(&kind),
                offset
            )));
        }
        if offset.saturating_add(box_size) > file_len {
            return Ok(Integrity::truncated(format!(
                "box '{}' at offset {} extends {} bytes past end of file",
                String::from_utf8_lossy(&kind),
                offset,
                offset.saturating_add(box_size) - file_len
            )));
        }

        if &kind == b"moov" {
            saw_moov = true;
        }
        offset += box_size;
    }

    if !saw_moov {
        return Ok(Integrity::truncated("no moov box"));
    }
    Ok(Integrity::Intact)
}

/// Probe an MP4 file for its tracks
pub fn probe(path: &Path) -> Result<StreamInfo, ProbeError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let context = read_mp4(&mut reader)
        .map_err(|e| ProbeError::ContainerParse(format!("MP4 parse error: {:?}", e)))?;

    let duration_ms = context.tracks.iter().find_map(|t| {
        let scale = t.timescale.map(|s| s.0).or(context.timescale.map(|s| s.0))?;
        t.duration
            .map(|d| if scale > 0 { d.0 * 1000 / scale } else { 0 })
    });

    let tracks = context
        .tracks
        .iter()
        .enumerate()
        .map(|(idx, track)| {
            let kind = match track.track_type {
                TrackType::Video => TrackKind::Video,
                TrackType::Audio => TrackKind::Audio,
                TrackType::Metadata => TrackKind::Subtitle,
                _ => TrackKind::Other,
            };
            TrackInfo {
                index: idx as u32,
                kind,
                codec: codec_name(track).unwrap_or_else(|| "Unknown".to_string()),
            }
        })
        .collect();

    Ok(StreamInfo {
        format: "MP4".to_string(),
        duration_ms,
        tracks,
    })
}

fn codec_name(track: &mp4parse::Track) -> Option<String> {
    let stsd = track.stsd.as_ref()?;
    let name = match stsd.descriptions.first()? {
        SampleEntry::Video(ve) => match &ve.codec_specific {
            mp4parse::VideoCodecSpecific::AVCConfig(_) => "AVC",
            mp4parse::VideoCodecSpecific::AV1Config(_) => "AV1",
            mp4parse::VideoCodecSpecific::VPxConfig(_) => "VP9",
            mp4parse::VideoCodecSpecific::ESDSConfig(_) => "MPEG-4",
            mp4parse::VideoCodecSpecific::H263Config(_) => "H.263",
            #[allow(unreachable_patterns)]
            _ => "Unknown",
        },
        SampleEntry::Audio(ae) => match &ae.codec_specific {
            mp4parse::AudioCodecSpecific::ES_Descriptor(_) => "AAC",
            mp4parse::AudioCodecSpecific::FLACSpecificBox(_) => "FLAC",
            mp4parse::AudioCodecSpecific::OpusSpecificBox(_) => "Opus",
            mp4parse::AudioCodecSpecific::ALACSpecificBox(_) => "ALAC",
            mp4parse::AudioCodecSpecific::MP3 => "MP3",
            mp4parse::AudioCodecSpecific::LPCM => "LPCM",
            #[allow(unreachable_patterns)]
            _ => "Unknown",
        },
        _ => "MP4 Text",
    };
    Some(name.to_string())
}
