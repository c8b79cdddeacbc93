//! Tests for the `reconcile` application service.
//!
//! Drives a full `Reconciler` against the in-memory ports and checks the
//! run-level guarantees: repeat runs change nothing, version changes
//! converge, restarts only follow plugin changes, the first failure stops
//! the run and one-time actions happen once.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::sync::atomic::Ordering;

use converge_common::{ActionOutcome, FailureKind, RunStatus};
use converge_cli::domain::TemplateId;

use crate::helpers::{ENVIRONMENT, Harness, desired, full_desired, plugins_only};
use crate::mocks::LATEST;

// ── Fresh server ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_server_runs_every_action_in_order() {
    let h = Harness::default();

    let report = h.run(&full_desired()).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(
        report.completed_keys(),
        vec![
            "prepare_layout",
            "plugin_git",
            "git_pinned",
            "plugin_workflow-aggregator",
            "restart",
            "automation_user_created",
            "resolve_credential_secrets",
            "credential_deploy-key",
            "bootstrap_job",
            "settings",
        ]
    );
    assert!(report.finished_at.is_some());
    assert_eq!(h.server.restarts(), 1);
    assert_eq!(h.state.pin("git").as_deref(), Some("3.9.1"));
    assert_eq!(h.state.pin("workflow-aggregator"), None);
    assert!(h.state.has_flag("automation_user_created"));
    assert!(h.fs.has_dir(Path::new("/var/lib/jenkins/init.groovy.d")));
}

#[tokio::test]
async fn test_unpinned_plugin_installs_latest_without_pin() {
    let h = Harness::default();

    let report = h.run(&plugins_only("  git: ~\n")).await;

    assert!(report.is_success());
    assert_eq!(h.server.installs(), vec![("git".to_string(), None)]);
    assert_eq!(h.server.live_version("git").as_deref(), Some(LATEST));
    assert_eq!(h.state.pin("git"), None);
}

#[tokio::test]
async fn test_empty_document_only_prepares_layout() {
    let h = Harness::default();

    let report = h.run(&desired("{}")).await;

    assert!(report.is_success());
    assert_eq!(report.find("plugins").unwrap().outcome, ActionOutcome::Skipped);
    assert_eq!(report.find("restart").unwrap().outcome, ActionOutcome::Skipped);
    assert!(h.server.scripts().is_empty());
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let h = Harness::default();
    let doc = full_desired();
    assert!(h.run(&doc).await.is_success());
    let installs = h.server.installs().len();
    let scripts = h.server.scripts().len();

    let report = h.run(&doc).await;

    assert!(report.is_success());
    assert_eq!(report.changed_count(), 0, "{:#?}", report.actions);
    assert_eq!(h.server.installs().len(), installs);
    assert_eq!(h.server.scripts().len(), scripts);
    assert_eq!(h.server.restarts(), 1);
}

#[tokio::test]
async fn test_unchanged_script_actions_are_satisfied_by_digest() {
    let h = Harness::default();
    let doc = full_desired();
    h.run(&doc).await;

    let report = h.run(&doc).await;

    for key in ["credential_deploy-key", "bootstrap_job", "settings"] {
        let record = report.find(key).unwrap();
        assert_eq!(record.outcome, ActionOutcome::Skipped, "{key}");
        assert_eq!(record.detail, "already satisfied");
    }
}

// ── Version convergence ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_changed_pinned_version_reinstalls_and_repins() {
    let h = Harness::default();
    h.run(&plugins_only("  git: \"3.9.1\"\n")).await;

    let report = h.run(&plugins_only("  git: \"3.10.0\"\n")).await;

    assert!(report.is_success());
    assert_eq!(
        h.server.installs().last().cloned(),
        Some(("git".to_string(), Some("3.10.0".to_string())))
    );
    assert_eq!(h.server.live_version("git").as_deref(), Some("3.10.0"));
    assert_eq!(h.state.pin("git").as_deref(), Some("3.10.0"));
    assert_eq!(h.server.restarts(), 2);
}

#[tokio::test]
async fn test_pinned_plugin_drifted_on_server_is_reinstalled() {
    let h = Harness {
        state: crate::mocks::MemoryState::default().with_pin("git", "3.9.1"),
        server: crate::mocks::RecordingServer::default().with_installed("git", "3.9.0"),
        ..Harness::default()
    };

    let report = h.run(&plugins_only("  git: \"3.9.1\"\n")).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(
        h.server.installs(),
        vec![("git".to_string(), Some("3.9.1".to_string()))]
    );
    assert_eq!(h.server.live_version("git").as_deref(), Some("3.9.1"));
    assert_eq!(h.state.pin("git").as_deref(), Some("3.9.1"));
    assert_eq!(report.find("restart").unwrap().outcome, ActionOutcome::Changed);
    assert!(report.find("git_pinned").is_none());
}

#[tokio::test]
async fn test_unpinned_install_becomes_pinned() {
    let h = Harness::default();
    h.run(&plugins_only("  git: ~\n")).await;
    assert_eq!(h.state.pin("git"), None);

    let report = h.run(&plugins_only("  git: \"3.9.1\"\n")).await;

    assert!(report.is_success());
    assert_eq!(report.find("plugin_git").unwrap().outcome, ActionOutcome::Changed);
    assert_eq!(report.find("git_pinned").unwrap().outcome, ActionOutcome::Changed);
    assert_eq!(h.server.live_version("git").as_deref(), Some("3.9.1"));
    assert_eq!(h.state.pin("git").as_deref(), Some("3.9.1"));
}

#[tokio::test]
async fn test_pinning_a_matching_install_only_records_the_pin() {
    let h = Harness {
        server: crate::mocks::RecordingServer::default().with_installed("git", "3.9.1"),
        ..Harness::default()
    };

    let report = h.run(&plugins_only("  git: \"3.9.1\"\n")).await;

    assert!(report.is_success());
    assert!(h.server.installs().is_empty());
    assert_eq!(report.find("plugin_git").unwrap().outcome, ActionOutcome::Unchanged);
    assert_eq!(h.state.pin("git").as_deref(), Some("3.9.1"));
    assert_eq!(h.server.restarts(), 0, "only the pin changed");
}

#[tokio::test]
async fn test_dropped_plugin_loses_its_pin_but_stays_installed() {
    let h = Harness::default();
    h.run(&plugins_only("  git: \"3.9.1\"\n  matrix-auth: ~\n")).await;

    let report = h.run(&plugins_only("  matrix-auth: ~\n")).await;

    assert!(report.is_success());
    assert_eq!(report.find("git_pinned").unwrap().outcome, ActionOutcome::Changed);
    assert_eq!(h.state.pin("git"), None);
    assert_eq!(h.server.live_version("git").as_deref(), Some("3.9.1"));
}

// ── Restart gating ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_restart_skipped_when_no_plugin_changed() {
    let h = Harness::default();
    let doc = plugins_only("  git: ~\n");
    h.run(&doc).await;

    let report = h.run(&doc).await;

    let restart = report.find("restart").unwrap();
    assert_eq!(restart.outcome, ActionOutcome::Skipped);
    assert_eq!(restart.detail, "no plugin changed");
    assert_eq!(h.server.restarts(), 1);
}

#[tokio::test]
async fn test_restart_runs_before_later_actions() {
    let h = Harness::default();

    h.run(&full_desired()).await;

    let scripts = h.server.scripts();
    assert!(scripts[0].starts_with("safe_restart\n"), "{scripts:?}");
    assert!(scripts[1].starts_with("automation_user\n"), "{scripts:?}");
}

#[tokio::test]
async fn test_restart_waits_through_quiet_down_until_server_returns() {
    let h = Harness::default();
    h.server.queue_readiness(&[true, true, false]);

    let report = h.run(&plugins_only("  git: ~\n")).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(report.find("restart").unwrap().outcome, ActionOutcome::Changed);
    assert_eq!(h.server.health_checks(), 4);
}

#[tokio::test]
async fn test_restart_that_never_goes_down_fails_run() {
    let h = Harness::default();
    h.server.queue_readiness(&[true]);

    let report = h.run(&full_desired()).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "restart");
    assert_eq!(failure.kind, FailureKind::EffectFailed);
    assert!(failure.message.contains("did not go down"), "{}", failure.message);
    assert!(h.server.scripts_for(TemplateId::AutomationUser).is_empty());
}

#[tokio::test]
async fn test_server_not_returning_after_restart_fails_run() {
    let h = Harness::default();
    h.server.ready.store(false, Ordering::SeqCst);

    let report = h.run(&full_desired()).await;

    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "restart");
    assert_eq!(failure.kind, FailureKind::EffectFailed);
    assert!(failure.message.contains("did not come back"), "{}", failure.message);
    assert!(h.server.scripts_for(TemplateId::AutomationUser).is_empty());
}

// ── Fail-fast ordering ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_action_stops_the_run() {
    let h = Harness::default();
    h.server.fail_scripts_containing("automation_user");

    let report = h.run(&full_desired()).await;

    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "automation_user_created");
    assert_eq!(failure.kind, FailureKind::EffectFailed);
    assert!(failure.message.contains("MissingPropertyException"));
    assert!(!failure.requires_manual_reconciliation);
    assert!(!h.state.has_flag("automation_user_created"));
    assert!(h.secrets.lookups().is_empty(), "later actions must not start");
    assert_eq!(h.reporter.warnings().len(), 1);
    // Earlier actions stay applied.
    assert_eq!(h.state.pin("git").as_deref(), Some("3.9.1"));
}

#[tokio::test]
async fn test_rerun_after_failure_resumes_without_redoing_work() {
    let h = Harness::default();
    let doc = full_desired();
    h.server.fail_scripts_containing("bootstrap_job");
    let first = h.run(&doc).await;
    assert_eq!(first.failure.as_ref().unwrap().action_key, "bootstrap_job");
    let installs = h.server.installs().len();
    h.server.clear_failures();

    let report = h.run(&doc).await;

    assert!(report.is_success());
    assert_eq!(h.server.installs().len(), installs);
    assert_eq!(h.server.restarts(), 1);
    assert_eq!(h.server.scripts_for(TemplateId::AutomationUser).len(), 1);
    assert_eq!(h.server.scripts_for(TemplateId::PrivateKeyCredential).len(), 1);
    assert_eq!(report.find("bootstrap_job").unwrap().outcome, ActionOutcome::Changed);
}

#[tokio::test]
async fn test_install_error_is_effect_failure_on_plugin() {
    let h = Harness::default();
    h.server.fail_install_of("workflow-aggregator");

    let report = h.run(&full_desired()).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "plugin_workflow-aggregator");
    assert_eq!(failure.kind, FailureKind::EffectFailed);
    assert!(failure.message.contains("update center unreachable"));
    assert_eq!(h.server.restarts(), 0);
}

#[tokio::test]
async fn test_unreadable_state_is_precondition_failure() {
    let h = Harness::default();
    h.state.fail_reads.store(true, Ordering::SeqCst);

    let report = h.run(&full_desired()).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "plugins");
    assert_eq!(failure.kind, FailureKind::PreconditionCheckFailed);
    assert!(h.server.installs().is_empty());
}

#[tokio::test]
async fn test_lost_marker_requires_manual_reconciliation() {
    let h = Harness {
        state: crate::mocks::MemoryState::default().with_pin("git", "3.9.1"),
        server: crate::mocks::RecordingServer::default()
            .with_installed("git", "3.9.1")
            .with_installed("workflow-aggregator", LATEST),
        ..Harness::default()
    };
    h.state.fail_writes.store(true, Ordering::SeqCst);

    let report = h.run(&full_desired()).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "automation_user_created");
    assert_eq!(failure.kind, FailureKind::PostconditionWriteFailed);
    assert!(failure.requires_manual_reconciliation);
    assert_eq!(h.server.scripts_for(TemplateId::AutomationUser).len(), 1);
}

#[tokio::test]
async fn test_stalled_marker_write_times_out_as_postcondition_failure() {
    let mut h = Harness::default();
    h.options.action_timeout = std::time::Duration::from_millis(20);
    h.state.stall_writes.store(true, Ordering::SeqCst);

    let report = h.run(&desired("settings:\n  executor_count: 2\n")).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "settings");
    assert_eq!(failure.kind, FailureKind::PostconditionWriteFailed);
    assert!(failure.message.contains("timed out"), "{}", failure.message);
    assert_eq!(h.server.scripts_for(TemplateId::Settings).len(), 1);
}

// ── Secrets ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_secret_fails_before_any_credential_is_registered() {
    let h = Harness {
        secrets: crate::mocks::MapSecrets::default(),
        ..Harness::default()
    };

    let report = h.run(&full_desired()).await;

    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "resolve_credential_secrets");
    assert_eq!(failure.kind, FailureKind::SecretResolutionFailed);
    assert!(failure.message.contains("deploy-key"), "{}", failure.message);
    assert!(h.server.scripts_for(TemplateId::PrivateKeyCredential).is_empty());
    assert!(h.state.has_flag("automation_user_created"));
}

#[tokio::test]
async fn test_secrets_are_looked_up_in_configured_environment() {
    let h = Harness::default();

    h.run(&full_desired()).await;

    assert_eq!(
        h.secrets.lookups(),
        vec![(ENVIRONMENT.to_string(), "deploy_key".to_string())]
    );
}

#[tokio::test]
async fn test_rotated_secret_reregisters_credential() {
    let h = Harness::default();
    let doc = full_desired();
    h.run(&doc).await;
    let before = h.state.digest("credential_deploy-key");
    h.secrets.set("deploy_key", "deploy", "-----BEGIN NEW KEY-----");

    let report = h.run(&doc).await;

    assert_eq!(
        report.find("credential_deploy-key").unwrap().outcome,
        ActionOutcome::Changed
    );
    assert_ne!(h.state.digest("credential_deploy-key"), before);
    assert_eq!(h.server.scripts_for(TemplateId::PrivateKeyCredential).len(), 2);
}

#[tokio::test]
async fn test_secret_values_never_reach_the_report() {
    let h = Harness::default();

    let report = h.run(&full_desired()).await;

    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("BEGIN KEY"));
}

// ── One-time user creation ───────────────────────────────────────────────────

const USER_FROM_BAG: &str = r#"
automation_user:
  username: automation
  secret_ref: automation_user
"#;

#[tokio::test]
async fn test_automation_user_key_is_read_from_secret_store() {
    let h = Harness::default();
    h.secrets.set("automation_user", "", "ssh-ed25519 AAAAC3Nz bag@ci");

    let report = h.run(&desired(USER_FROM_BAG)).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(
        h.secrets.lookups(),
        vec![(ENVIRONMENT.to_string(), "automation_user".to_string())]
    );
    let scripts = h.server.scripts_for(TemplateId::AutomationUser);
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("ssh-ed25519 AAAAC3Nz bag@ci"), "{}", scripts[0]);
}

#[tokio::test]
async fn test_missing_automation_user_secret_stops_before_user_creation() {
    let h = Harness::default();

    let report = h.run(&desired(USER_FROM_BAG)).await;

    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.action_key, "automation_user_created");
    assert_eq!(failure.kind, FailureKind::SecretResolutionFailed);
    assert!(failure.message.contains("automation_user"), "{}", failure.message);
    assert!(h.server.scripts_for(TemplateId::AutomationUser).is_empty());
    assert!(!h.state.has_flag("automation_user_created"));
}

#[tokio::test]
async fn test_created_user_does_not_touch_its_secret_again() {
    let h = Harness::default();
    h.secrets.set("automation_user", "", "ssh-ed25519 AAAAC3Nz bag@ci");
    let doc = desired(USER_FROM_BAG);
    h.run(&doc).await;

    let report = h.run(&doc).await;

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(h.secrets.lookups().len(), 1);
}

#[tokio::test]
async fn test_automation_user_is_created_once() {
    let h = Harness::default();
    h.run(&full_desired()).await;
    let mut doc = full_desired();
    doc.automation_user.as_mut().unwrap().public_key = Some("ssh-ed25519 AAAAC3Nz rotated@ci".into());

    let report = h.run(&doc).await;

    let record = report.find("automation_user_created").unwrap();
    assert_eq!(record.outcome, ActionOutcome::Skipped);
    assert_eq!(record.detail, "already satisfied");
    assert_eq!(h.server.scripts_for(TemplateId::AutomationUser).len(), 1);
}

#[tokio::test]
async fn test_existing_flag_from_earlier_tool_is_honoured() {
    let h = Harness {
        state: crate::mocks::MemoryState::default().with_flag("automation_user_created"),
        ..Harness::default()
    };

    h.run(&full_desired()).await;

    assert!(h.server.scripts_for(TemplateId::AutomationUser).is_empty());
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_settings_change_reapplies_settings_only() {
    let h = Harness::default();
    h.run(&full_desired()).await;
    let doc = desired(
        r#"
plugins:
  git: "3.9.1"
  workflow-aggregator: ~
automation_user:
  username: automation
  public_key: "ssh-rsa AAAAB3NzaC1yc2E automation@ci"
credentials:
  - id: deploy-key
    kind: private_key
    username: deploy
    secret_ref: deploy_key
bootstrap_job:
  repository: "git@git.example.com:ci/jobs.git"
  script_path: "jobs/*.groovy"
  credential_id: deploy-key
settings:
  executor_count: 2
  system_url: "https://ci.example.com/"
"#,
    );

    let report = h.run(&doc).await;

    assert_eq!(report.changed_count(), 1, "{:#?}", report.actions);
    assert_eq!(report.find("settings").unwrap().outcome, ActionOutcome::Changed);
    let last = h.server.scripts().pop().unwrap();
    assert!(last.contains("\"executor_count\":\"2\""), "{last}");
    assert!(last.contains(ENVIRONMENT));
}

// ── Plugin manifest ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_manifest_is_rewritten_only_when_plugins_change() {
    let mut h = Harness::default();
    h.options.manifest_path = Some("/var/lib/jenkins/plugins.gradle".into());
    let path = Path::new("/var/lib/jenkins/plugins.gradle");

    let first = h.run(&plugins_only("  git: \"3.9.1\"\n")).await;
    let second = h.run(&plugins_only("  git: \"3.9.1\"\n")).await;

    assert_eq!(first.find("plugin_manifest").unwrap().outcome, ActionOutcome::Changed);
    assert_eq!(second.find("plugin_manifest").unwrap().outcome, ActionOutcome::Unchanged);
    let manifest = h.fs.file(path).unwrap();
    assert!(manifest.starts_with("plugin_manifest\n"));
    assert!(manifest.contains("3.9.1"));
}
