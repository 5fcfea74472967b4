//! Integration tests for omniscan-probe

use std::io::Write;

use omniscan_probe::{check_integrity, probe_streams, Integrity, ProbeError};
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(data).unwrap();
    path
}

fn mp4_box(kind: &[u8; 4], payload: usize) -> Vec<u8> {
    let mut data = ((payload + 8) as u32).to_be_bytes().to_vec();
    data.extend_from_slice(kind);
    data.extend(std::iter::repeat(0xAAu8).take(payload));
    data
}

/// An mkv extension with a plain-text body has lost its envelope
#[test]
fn test_mkv_without_magic_is_truncated() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "movie.mkv", b"this is not a matroska file at all");

    let verdict = check_integrity(&path).unwrap();
    assert!(matches!(verdict, Integrity::Truncated(r) if r.contains("Matroska")));
}

/// A container-less format only gets sampled reads
#[test]
fn test_avi_without_structure_checks() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "movie.avi", &[0x42u8; 8192]);

    assert_eq!(check_integrity(&path).unwrap(), Integrity::Intact);
}

#[test]
fn test_mkv_cut_short() {
    let dir = TempDir::new().unwrap();
    let mut data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x80, 0x18, 0x53, 0x80, 0x67];
    // 4-byte vint declaring 1 MiB of segment data
    data.extend_from_slice(&[0x10, 0x10, 0x00, 0x00]);
    data.extend_from_slice(&[0u8; 4096]);
    let path = write_file(&dir, "cut.mkv", &data);

    let verdict = check_integrity(&path).unwrap();
    assert!(matches!(verdict, Integrity::Truncated(r) if r.contains("Segment declares")));
}

#[test]
fn test_mp4_intact_and_truncated() {
    let dir = TempDir::new().unwrap();

    let mut data = mp4_box(b"ftyp", 12);
    data.extend(mp4_box(b"moov", 64));
    data.extend(mp4_box(b"mdat", 2048));
    let good = write_file(&dir, "good.mp4", &data);
    assert_eq!(check_integrity(&good).unwrap(), Integrity::Intact);

    data.truncate(data.len() - 1000);
    let bad = write_file(&dir, "bad.mp4", &data);
    assert!(!check_integrity(&bad).unwrap().is_intact());
}

#[test]
fn test_probe_streams_nonexistent() {
    let result = probe_streams("/this/file/does/not/exist.mkv");
    assert!(matches!(result, Err(ProbeError::FileNotFound(_))));
}

#[test]
fn test_probe_streams_garbage_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "junk.mkv", &[0u8; 512]);
    assert!(probe_streams(&path).is_err());
}

/// Older QuickTime writers lead with a `wide` padding atom
#[test]
fn test_mov_with_leading_wide_atom_is_intact() {
    let dir = TempDir::new().unwrap();
    let mut data = mp4_box(b"wide", 0);
    data.extend(mp4_box(b"mdat", 64));
    data.extend(mp4_box(b"moov", 32));
    let path = write_file(&dir, "clip.mov", &data);

    assert_eq!(check_integrity(&path).unwrap(), Integrity::Intact);
}
