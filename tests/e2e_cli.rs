//! CLI end-to-end tests
//!
//! Tests for the omniscan command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the omniscan binary
#[allow(deprecated)]
fn omniscan_cmd() -> Command {
    Command::cargo_bin("omniscan").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = omniscan_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = omniscan_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("omniscan"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = omniscan_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_generate_secret() {
    let mut cmd = omniscan_cmd();
    cmd.arg("generate-secret")
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[server]
port = 9090

[scan]
debounce_secs = 5

[[roots]]
path = "/media/tv"
"#,
    )
    .unwrap();

    let mut cmd = omniscan_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Roots: 1"));
}

#[test]
fn test_cli_validate_rejects_bad_config() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "[scan]\nmax_workers = 0\n").unwrap();

    let mut cmd = omniscan_cmd();
    cmd.arg("validate")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_workers"));
}

#[test]
fn test_cli_check_empty_file() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("empty.mkv");
    fs::write(&file, b"").unwrap();

    let mut cmd = omniscan_cmd();
    cmd.arg("check")
        .arg(&file)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"corrupt-zero-byte\""));
}

#[test]
fn test_cli_check_missing_file() {
    let mut cmd = omniscan_cmd();
    cmd.arg("check")
        .arg("/nonexistent/omniscan/file.mkv")
        .assert()
        .failure();
}

#[test]
fn test_cli_scan_directory() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("Show")).unwrap();
    fs::write(dir.path().join("Show/empty.mkv"), b"").unwrap();
    fs::write(dir.path().join("Show/readme.txt"), b"text").unwrap();

    let mut cmd = omniscan_cmd();
    cmd.current_dir(dir.path())
        .arg("scan")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Added: 1"))
        .stdout(predicate::str::contains("Corrupt: 1"))
        .stdout(predicate::str::contains("empty.mkv"));
}

#[test]
fn test_cli_scan_json() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("empty.mp4"), b"").unwrap();

    let output = omniscan_cmd()
        .current_dir(dir.path())
        .arg("scan")
        .arg(dir.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["counts"]["added"], 1);
    assert_eq!(summary["counts"]["corrupt"], 1);
    assert_eq!(summary["reason"], "manual");
}

#[test]
fn test_cli_scan_missing_directory() {
    let mut cmd = omniscan_cmd();
    cmd.arg("scan")
        .arg("/nonexistent/omniscan/dir")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot scan"));
}
