//! Application service: plugin-set convergence.
//!
//! Snapshots recorded pins and live install state, plans with
//! [`reconcile_plugins`], then executes the plan step by step. Imports only
//! from `crate::domain` and `crate::application::ports`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use converge_common::{ActionOutcome, RunReport};

use crate::application::ports::{HostFs, PluginInstaller, ProgressReporter, StateStore, TemplateRenderer};
use crate::application::services::bounded;
use crate::domain::templates::manifest_vars;
use crate::domain::{
    CurrentPlugin, PluginAction, PluginPlan, ReconcileError, TemplateId, keys, reconcile_plugins,
};

/// Result of converging the plugin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSetOutcome {
    /// Every step that was executed, cleanup first.
    pub actions: Vec<PluginAction>,
    /// `true` if any install actually changed the installed set or a version.
    pub any_changed: bool,
}

pub struct PluginSetReconciler<'a, S, I, T, F, R> {
    pub state: &'a S,
    pub installer: &'a I,
    pub templates: &'a T,
    pub fs: &'a F,
    pub reporter: &'a R,
    pub action_timeout: Duration,
    /// Render the plugin manifest here before planning, when set.
    pub manifest_path: Option<&'a Path>,
}

impl<S, I, T, F, R> PluginSetReconciler<'_, S, I, T, F, R>
where
    S: StateStore,
    I: PluginInstaller,
    T: TemplateRenderer,
    F: HostFs,
    R: ProgressReporter,
{
    /// Recorded pins plus live install state for every desired or pinned
    /// plugin.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionCheckFailed` if the store or installer cannot be
    /// queried.
    pub async fn snapshot(
        &self,
        desired: &BTreeMap<String, Option<String>>,
    ) -> Result<BTreeMap<String, CurrentPlugin>, ReconcileError> {
        let pins = bounded(self.action_timeout, "listing pins", self.state.list_pins())
            .await
            .map_err(|e| ReconcileError::precondition(keys::PLUGINS, &e))?;

        let mut current: BTreeMap<String, CurrentPlugin> = BTreeMap::new();
        for pin in pins {
            let name = pin.plugin_name.clone();
            current.entry(name).or_default().pin = Some(pin);
        }
        for name in desired.keys() {
            current.entry(name.clone()).or_default();
        }

        for (name, cur) in &mut current {
            let what = format!("querying plugin {name}");
            cur.installed = bounded(self.action_timeout, &what, self.installer.installed(name))
                .await
                .map_err(|e| ReconcileError::precondition(&keys::plugin_key(name), &e))?;
        }
        Ok(current)
    }

    /// Snapshot and plan without executing anything.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionCheckFailed` if the snapshot cannot be taken.
    pub async fn plan(
        &self,
        desired: &BTreeMap<String, Option<String>>,
    ) -> Result<PluginPlan, ReconcileError> {
        let current = self.snapshot(desired).await?;
        Ok(reconcile_plugins(desired, &current))
    }

    /// Converge the plugin set, recording every step into `report`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step and returns its error.
    pub async fn reconcile(
        &self,
        desired: &BTreeMap<String, Option<String>>,
        report: &mut RunReport,
    ) -> Result<PluginSetOutcome, ReconcileError> {
        if let Some(path) = self.manifest_path {
            self.write_manifest(path, desired, report).await?;
        }

        let current = self.snapshot(desired).await?;
        let plan = reconcile_plugins(desired, &current);
        tracing::debug!(
            cleanup = plan.cleanup.len(),
            actions = plan.actions.len(),
            "plugin plan computed"
        );

        if plan.steps().next().is_none() {
            report.record(keys::PLUGINS, ActionOutcome::Skipped, "no plugins declared or pinned");
            return Ok(PluginSetOutcome {
                actions: Vec::new(),
                any_changed: false,
            });
        }

        let mut any_changed = false;
        for step in plan.steps() {
            any_changed |= self.apply(step, &current, report).await?;
        }

        Ok(PluginSetOutcome {
            actions: plan.steps().cloned().collect(),
            any_changed,
        })
    }

    async fn write_manifest(
        &self,
        path: &Path,
        desired: &BTreeMap<String, Option<String>>,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        let key = keys::PLUGIN_MANIFEST;
        let content = self
            .templates
            .render(TemplateId::PluginManifest, &manifest_vars(desired))
            .map_err(|e| ReconcileError::effect(key, &e))?;
        let written = bounded(
            self.action_timeout,
            "writing plugin manifest",
            self.fs.write_if_changed(path, &content),
        )
        .await
        .map_err(|e| ReconcileError::effect(key, &e))?;

        let detail = path.display().to_string();
        if written {
            tracing::info!(action = key, outcome = "changed", path = %detail, "manifest written");
            report.record(key, ActionOutcome::Changed, detail);
        } else {
            report.record(key, ActionOutcome::Unchanged, detail);
        }
        Ok(())
    }

    /// Execute one step. Returns `true` if it changed installed plugins.
    async fn apply(
        &self,
        step: &PluginAction,
        current: &BTreeMap<String, CurrentPlugin>,
        report: &mut RunReport,
    ) -> Result<bool, ReconcileError> {
        let key = step.key();
        match step {
            PluginAction::NoOp { .. } => {
                tracing::debug!(action = %key, outcome = "skipped", "already satisfied");
                report.record(key, ActionOutcome::Skipped, step.describe());
                Ok(false)
            }
            PluginAction::RemovePin { name } => {
                bounded(self.action_timeout, "removing pin", self.state.delete_pin(name))
                    .await
                    .map_err(|e| ReconcileError::effect(&key, &e))?;
                tracing::info!(action = %key, outcome = "changed", "pin removed");
                report.record(key, ActionOutcome::Changed, step.describe());
                Ok(false)
            }
            PluginAction::InstallUnpinned { name } => self.install(&key, name, None, step, report).await,
            PluginAction::InstallPinned { name, version } => {
                let live = current
                    .get(name)
                    .and_then(|c| c.installed.as_ref())
                    .and_then(|i| i.version.as_deref());
                if live == Some(version.as_str()) {
                    tracing::debug!(action = %key, outcome = "unchanged", version = %version, "already at version");
                    report.record(key, ActionOutcome::Unchanged, format!("{name} already at {version}"));
                    return Ok(false);
                }
                self.install(&key, name, Some(version), step, report).await
            }
            PluginAction::WritePin { name, version } => {
                bounded(self.action_timeout, "writing pin", self.state.set_pin(name, version))
                    .await
                    .map_err(|e| ReconcileError::postcondition(&key, &e))?;
                tracing::info!(action = %key, outcome = "changed", version = %version, "pin written");
                report.record(key, ActionOutcome::Changed, step.describe());
                Ok(false)
            }
        }
    }

    async fn install(
        &self,
        key: &str,
        name: &str,
        version: Option<&str>,
        step: &PluginAction,
        report: &mut RunReport,
    ) -> Result<bool, ReconcileError> {
        self.reporter.step(&format!("{}...", step.describe()));
        let what = format!("installing {name}");
        let outcome = bounded(self.action_timeout, &what, self.installer.install(name, version))
            .await
            .map_err(|e| ReconcileError::effect(key, &e))?;

        if outcome.changed {
            tracing::info!(action = key, outcome = "changed", "plugin installed");
            self.reporter.success(&step.describe());
            report.record(key, ActionOutcome::Changed, step.describe());
        } else {
            tracing::debug!(action = key, outcome = "unchanged", "installer reported no change");
            report.record(key, ActionOutcome::Unchanged, step.describe());
        }
        Ok(outcome.changed)
    }
}
