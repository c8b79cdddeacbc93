//! Command implementations

pub mod apply;
pub mod config;
pub mod plan;
pub mod state;
pub mod validate;
pub mod version;

use anyhow::{Context, Result};

use crate::application::ports::ProgressReporter;
use crate::application::services::reconcile::{ReconcileOptions, Reconciler};
use crate::domain::ConvergeConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::fs::LocalFs;
use crate::infra::jenkins::JenkinsCli;
use crate::infra::secrets::FileSecretStore;
use crate::infra::state::FileStateStore;
use crate::infra::templates::HandlebarsRenderer;

/// Production collaborators for one run, built from the tool configuration.
pub(crate) struct Runtime {
    state: FileStateStore,
    server: JenkinsCli<TokioCommandRunner>,
    templates: HandlebarsRenderer,
    secrets: FileSecretStore,
    fs: LocalFs,
    options: ReconcileOptions,
}

impl Runtime {
    pub(crate) fn from_config(config: &ConvergeConfig) -> Result<Self> {
        let runner = TokioCommandRunner::new(config.action_timeout());
        Ok(Self {
            state: FileStateStore::new(config.state_dir()),
            server: JenkinsCli::new(runner, config),
            templates: HandlebarsRenderer::new().context("loading script templates")?,
            secrets: FileSecretStore::new(config.secrets.dir.clone()),
            fs: LocalFs,
            options: ReconcileOptions {
                environment: config.environment.clone(),
                action_timeout: config.action_timeout(),
                restart_timeout: config.restart_timeout(),
                poll_interval: config.poll_interval(),
                layout_dirs: config.layout_dirs(),
                manifest_path: config.manifest.path.clone(),
            },
        })
    }

    pub(crate) fn reconciler<'a, R: ProgressReporter>(
        &'a self,
        reporter: &'a R,
    ) -> Reconciler<'a, FileStateStore, JenkinsCli<TokioCommandRunner>, HandlebarsRenderer, FileSecretStore, LocalFs, R>
    {
        Reconciler {
            state: &self.state,
            server: &self.server,
            templates: &self.templates,
            secrets: &self.secrets,
            fs: &self.fs,
            reporter,
            options: self.options.clone(),
        }
    }
}
