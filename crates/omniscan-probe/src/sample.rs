//! Sampled reads and content fingerprints.
//!
//! A file whose inode claims more bytes than the disk can return fails the
//! sampled reads even when its container header looks fine.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ProbeError;
use crate::types::Integrity;

/// Size of each sampled read.
pub const SAMPLE_LEN: u64 = 1024;
/// The tail sample starts this far before the end of the file.
pub const TAIL_OFFSET: u64 = 1024 * 1024;
/// Files above this size also get random samples.
pub const RANDOM_SAMPLE_THRESHOLD: u64 = 5 * 1024 * 1024;
pub const RANDOM_SAMPLES: usize = 3;
/// Bytes hashed from each end of the file for a fingerprint.
pub const FINGERPRINT_WINDOW: u64 = 64 * 1024;

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, len: u64) -> Result<usize, ProbeError> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Tail read plus, for large files, random reads. Each must return data.
pub fn check_samples<R: Read + Seek, G: Rng>(
    reader: &mut R,
    file_len: u64,
    rng: &mut G,
) -> Result<Integrity, ProbeError> {
    if file_len == 0 {
        return Ok(Integrity::truncated("file is empty"));
    }

    let tail = file_len.saturating_sub(TAIL_OFFSET);
    let want = SAMPLE_LEN.min(file_len - tail);
    let got = read_at(reader, tail, want)?;
    if (got as u64) < want {
        return Ok(Integrity::truncated(format!(
            "tail read at offset {} returned {} of {} bytes",
            tail, got, want
        )));
    }

    if file_len > RANDOM_SAMPLE_THRESHOLD {
        for _ in 0..RANDOM_SAMPLES {
            let offset = rng.gen_range(0..file_len - SAMPLE_LEN);
            let got = read_at(reader, offset, SAMPLE_LEN)?;
            if (got as u64) < SAMPLE_LEN {
                return Ok(Integrity::truncated(format!(
                    "sampled read at offset {} returned {} of {} bytes",
                    offset, got, SAMPLE_LEN
                )));
            }
        }
    }

    Ok(Integrity::Intact)
}

/// SHA-256 over the size, the first 64 KiB and the last 64 KiB.
pub fn fingerprint_reader<R: Read + Seek>(
    reader: &mut R,
    file_len: u64,
) -> Result<String, ProbeError> {
    let mut hasher = Sha256::new();
    hasher.update(file_len.to_le_bytes());

    let head_len = FINGERPRINT_WINDOW.min(file_len);
    let mut head = vec![0u8; head_len as usize];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut head)?;
    hasher.update(&head);

    if file_len > FINGERPRINT_WINDOW {
        let start = file_len.saturating_sub(FINGERPRINT_WINDOW).max(head_len);
        let mut tail = vec![0u8; (file_len - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut tail)?;
        hasher.update(&tail);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint a file on disk.
pub fn fingerprint(path: &std::path::Path) -> Result<String, ProbeError> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    fingerprint_reader(&mut file, len)
}
