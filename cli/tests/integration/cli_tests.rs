//! Integration tests for the converge CLI skeleton: help, version and the
//! offline failure paths of `apply` and `plan`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn converge(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("converge"));
    cmd.env("NO_COLOR", "1")
        .env("CONVERGE_CONFIG", dir.path().join("config.yaml"))
        .env_remove("CONVERGE_LOG");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let dir = TempDir::new().unwrap();
    converge(&dir)
        .env_remove("NO_COLOR")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "Idempotent reconciler for a single CI server",
        ));
}

#[test]
fn test_no_color_accepts_conventional_values() {
    let dir = TempDir::new().unwrap();
    for value in ["1", "true", "yes", ""] {
        converge(&dir)
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("converge v"))
            .stdout(predicate::str::contains("\u{1b}[").not());
    }
}

#[test]
fn test_cli_help_lists_every_command() {
    let dir = TempDir::new().unwrap();
    let output = converge(&dir).arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["apply", "plan", "validate", "state", "config", "version"] {
        assert!(help.contains(command), "missing {command} in:\n{help}");
    }
}

#[test]
fn test_version_command_shows_version() {
    let dir = TempDir::new().unwrap();
    converge(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!("converge v", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let dir = TempDir::new().unwrap();
    let output = converge(&dir).args(["version", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_unknown_command_is_rejected() {
    let dir = TempDir::new().unwrap();
    converge(&dir).arg("converge-everything").assert().code(2);
}

// --- apply / plan input handling ---

#[test]
fn test_apply_requires_desired_file() {
    let dir = TempDir::new().unwrap();
    converge(&dir)
        .args(["apply", "--yes"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--desired"));
}

#[test]
fn test_apply_missing_desired_file_fails_before_any_action() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");
    converge(&dir)
        .args(["apply", "--yes", "--desired"])
        .arg(&missing)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: cannot read"));
}

#[test]
fn test_apply_invalid_document_fails_before_any_action() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("desired.yaml");
    std::fs::write(&path, "plugins:\n  \"bad name\": ~\n").unwrap();
    converge(&dir)
        .args(["apply", "--yes", "--desired"])
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid plugin name"));
}

#[test]
fn test_plan_json_error_is_a_json_object() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.yaml");
    let output = converge(&dir)
        .args(["plan", "--json", "--desired"])
        .arg(&missing)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["error"], true);
    assert!(value["message"].as_str().unwrap().contains("cannot read"));
}
