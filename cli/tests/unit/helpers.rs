//! Shared fixtures: a harness wiring the in-memory ports into a
//! `Reconciler`, and desired-state documents written the way operators
//! write them.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::Duration;

use converge_cli::application::services::reconcile::{ReconcileOptions, Reconciler};
use converge_common::{DesiredState, RunReport};

use crate::mocks::{MapSecrets, MemoryFs, MemoryState, RecordingReporter, RecordingServer, StubRenderer};

pub const ENVIRONMENT: &str = "staging";

pub struct Harness {
    pub state: MemoryState,
    pub server: RecordingServer,
    pub templates: StubRenderer,
    pub secrets: MapSecrets,
    pub fs: MemoryFs,
    pub reporter: RecordingReporter,
    pub options: ReconcileOptions,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            state: MemoryState::default(),
            server: RecordingServer::default(),
            templates: StubRenderer,
            secrets: MapSecrets::default().with("deploy_key", "deploy", "-----BEGIN KEY-----"),
            fs: MemoryFs::default(),
            reporter: RecordingReporter::default(),
            options: ReconcileOptions {
                environment: ENVIRONMENT.to_string(),
                action_timeout: Duration::from_secs(5),
                restart_timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(1),
                layout_dirs: vec![
                    PathBuf::from("/var/lib/jenkins/.flags"),
                    PathBuf::from("/var/lib/jenkins/init.groovy.d"),
                ],
                manifest_path: None,
            },
        }
    }
}

impl Harness {
    pub fn reconciler(
        &self,
    ) -> Reconciler<'_, MemoryState, RecordingServer, StubRenderer, MapSecrets, MemoryFs, RecordingReporter>
    {
        Reconciler {
            state: &self.state,
            server: &self.server,
            templates: &self.templates,
            secrets: &self.secrets,
            fs: &self.fs,
            reporter: &self.reporter,
            options: self.options.clone(),
        }
    }

    pub async fn run(&self, desired: &DesiredState) -> RunReport {
        self.reconciler().reconcile(desired).await
    }
}

pub fn desired(yaml: &str) -> DesiredState {
    let desired: DesiredState = serde_yaml::from_str(yaml).expect("fixture parses");
    desired.validate().expect("fixture is valid");
    desired
}

/// Every block populated.
pub fn full_desired() -> DesiredState {
    desired(
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
  executor_count: 0
  system_url: "https://ci.example.com/"
"#,
    )
}

pub fn plugins_only(entries: &str) -> DesiredState {
    desired(&format!("plugins:\n{entries}"))
}
