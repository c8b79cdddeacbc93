//! Integration tests for `converge state`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn converge() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("converge"));
    cmd.env("NO_COLOR", "1");
    cmd
}

fn state_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("automation_user_created"),
        r#"{"action_key":"automation_user_created","completed_at":"2024-03-01T10:00:00Z"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("git_pinned"),
        r#"{"plugin_name":"git","version":"3.9.1","pinned":true}"#,
    )
    .unwrap();
    // Marker left behind by an older tool: empty file.
    std::fs::write(dir.path().join("job-dsl_pinned"), "").unwrap();
    dir
}

#[test]
fn test_state_lists_flags_and_pins() {
    let dir = state_dir();
    converge()
        .args(["state", "--state-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("automation_user_created"))
        .stdout(predicate::str::contains("2024-03-01 10:00:00 UTC"))
        .stdout(predicate::str::contains("3.9.1"))
        .stdout(predicate::str::contains("job-dsl"));
}

#[test]
fn test_state_json_separates_flags_from_pins() {
    let dir = state_dir();
    let output = converge()
        .args(["state", "--json", "--state-dir"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let flags = value["flags"].as_array().unwrap();
    let pins = value["pins"].as_array().unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["action_key"], "automation_user_created");
    assert_eq!(pins.len(), 2);
    assert_eq!(pins[0]["plugin_name"], "git");
    assert_eq!(pins[1]["plugin_name"], "job-dsl");
    assert_eq!(pins[1]["version"], "");
}

#[test]
fn test_state_of_missing_directory_is_empty() {
    let dir = TempDir::new().unwrap();
    converge()
        .args(["state", "--state-dir"])
        .arg(dir.path().join("never-created"))
        .assert()
        .success()
        .stdout(predicate::str::contains("none"));
}

#[test]
fn test_state_defaults_to_configured_directory() {
    let dir = state_dir();
    let config = TempDir::new().unwrap();
    let config_path = config.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!("state:\n  dir: {}\n", dir.path().display()),
    )
    .unwrap();
    converge()
        .arg("state")
        .env("CONVERGE_CONFIG", &config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("automation_user_created"));
}
