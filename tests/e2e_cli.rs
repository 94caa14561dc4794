//! CLI end-to-end tests
//!
//! Tests for the mediaforge command-line interface. None of them need
//! ffmpeg: jobs that would reach the engine are not run here.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the mediaforge binary
#[allow(deprecated)]
fn mediaforge_cmd() -> Command {
    Command::cargo_bin("mediaforge").unwrap()
}

/// Write a config whose database lives in `dir`.
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.json");
    let config = format!(
        r#"{{"storage": {{"db_path": "{}", "work_dir": "{}"}}}}"#,
        dir.join("mf.db").display(),
        dir.join("work").display()
    );
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = mediaforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = mediaforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mediaforge"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = mediaforge_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_presets_lists_defaults() {
    let mut cmd = mediaforge_cmd();
    cmd.arg("presets")
        .assert()
        .success()
        .stdout(predicate::str::contains("720p: 1280x720 libx264 crf 23"))
        .stdout(predicate::str::contains("1080p_hevc"));
}

#[test]
fn test_cli_validate_default_config() {
    let mut cmd = mediaforge_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_cli_validate_reports_warnings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{"tools": {"threads": 0}}"#).unwrap();

    let mut cmd = mediaforge_cmd();
    cmd.arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("tools.threads is 0"));
}

#[test]
fn test_cli_validate_rejects_bad_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let mut cmd = mediaforge_cmd();
    cmd.arg("validate").arg(&path).assert().failure();
}

#[test]
fn test_cli_tasks_for_unknown_user() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .args(["tasks", "--user", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks for user 5"));
}

#[test]
fn test_cli_cancel_without_task_is_noop() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .args(["cancel", "--user", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active task"));
}

#[test]
fn test_cli_reset_orphans_on_fresh_db() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .arg("reset-orphans")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset 0 orphaned task(s)"));
}

#[test]
fn test_cli_stats_on_fresh_db() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 0"))
        .stdout(predicate::str::contains("Running: 0"));
}

#[test]
fn test_cli_run_requires_preset_for_encode() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("a.mp4");
    fs::write(&input, b"x").unwrap();

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .args(["run", "--job", "encode"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--preset"));
}

#[test]
fn test_cli_run_rejects_unknown_job_kind() {
    let mut cmd = mediaforge_cmd();
    cmd.args(["run", "--job", "explode", "a.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown job kind"));
}

#[test]
fn test_cli_run_with_too_few_inputs_fails() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let input = dir.path().join("a.mp4");
    fs::write(&input, b"x").unwrap();

    let mut cmd = mediaforge_cmd();
    cmd.args(["--config"])
        .arg(&config)
        .args(["run", "--job", "merge_video_video", "--out"])
        .arg(dir.path().join("outbox"))
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("still needed: 1 more video"))
        .stderr(predicate::str::contains("not enough inputs"));
}
