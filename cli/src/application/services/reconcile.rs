//! Application service: the reconcile use-case.
//!
//! Walks the ordered action list from [`build_plan`], checking each guard
//! against the state store at the start of that action, applying the effect
//! through the matching collaborator and writing its marker. The first
//! failure ends the run; everything already applied stays applied.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use converge_common::{
    ActionOutcome, AutomationUser, DesiredState, RunFailure, RunReport, SecretRecord,
};
use serde_json::{Value, json};

use crate::application::ports::{
    HostFs, ManagedServer, ProgressReporter, SecretStore, StateStore, TemplateRenderer,
};
use crate::application::services::bounded;
use crate::application::services::plugin_set::PluginSetReconciler;
use crate::domain::digest::sha256_hex;
use crate::domain::templates::{
    automation_user_vars, bootstrap_vars, credential_vars, settings_vars,
};
use crate::domain::{ActionSpec, Guard, ReconcileError, Step, TemplateId, build_plan};

/// Run-wide knobs resolved from configuration before the run starts.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Selects the secret bags and is named in the settings script.
    pub environment: String,
    /// Upper bound for any single collaborator call.
    pub action_timeout: Duration,
    /// How long to wait for the server after a restart.
    pub restart_timeout: Duration,
    pub poll_interval: Duration,
    pub layout_dirs: Vec<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

/// Transient per-run state. Nothing here outlives `reconcile`.
#[derive(Default)]
struct RunContext {
    plugins_changed: bool,
    secrets: BTreeMap<String, SecretRecord>,
}

/// The collaborators one run talks to.
pub struct Reconciler<'a, S, M, T, X, F, R> {
    pub state: &'a S,
    pub server: &'a M,
    pub templates: &'a T,
    pub secrets: &'a X,
    pub fs: &'a F,
    pub reporter: &'a R,
    pub options: ReconcileOptions,
}

impl<S, M, T, X, F, R> Reconciler<'_, S, M, T, X, F, R>
where
    S: StateStore,
    M: ManagedServer,
    T: TemplateRenderer,
    X: SecretStore,
    F: HostFs,
    R: ProgressReporter,
{
    /// Converge the managed server onto `desired`.
    ///
    /// Never returns an error: a failing action is recorded in the report,
    /// which is then marked `Failed` and names the action.
    pub async fn reconcile(&self, desired: &DesiredState) -> RunReport {
        let mut report = RunReport::begin();
        let mut ctx = RunContext::default();

        for action in build_plan(desired) {
            tracing::debug!(action = %action.key, stage = action.step.stage(), "action start");
            if let Err(err) = self.run_action(&action, desired, &mut ctx, &mut report).await {
                tracing::error!(action = %err.action(), kind = ?err.kind(), "{}", err.message());
                self.reporter.warn(&err.to_string());
                report.fail(RunFailure::from(&err));
                return report;
            }
        }

        report.finish();
        report
    }

    /// The plugin-set reconciler sharing this run's collaborators.
    pub fn plugin_set(&self) -> PluginSetReconciler<'_, S, M, T, F, R> {
        PluginSetReconciler {
            state: self.state,
            installer: self.server,
            templates: self.templates,
            fs: self.fs,
            reporter: self.reporter,
            action_timeout: self.options.action_timeout,
            manifest_path: self.options.manifest_path.as_deref(),
        }
    }

    async fn run_action(
        &self,
        action: &ActionSpec,
        desired: &DesiredState,
        ctx: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        match &action.guard {
            Guard::UnlessFlag(flag) => {
                let done = bounded(self.options.action_timeout, "reading flag", self.state.get_flag(flag))
                    .await
                    .map_err(|e| ReconcileError::precondition(&action.key, &e))?;
                if done {
                    skip(report, &action.key, "already satisfied");
                    return Ok(());
                }
            }
            Guard::IfPluginsChanged if !ctx.plugins_changed => {
                skip(report, &action.key, "no plugin changed");
                return Ok(());
            }
            Guard::Always | Guard::IfPluginsChanged | Guard::UnlessDigestMatches(_) => {}
        }

        match &action.step {
            Step::PrepareLayout => self.prepare_layout(&action.key, report).await,
            Step::Plugins => {
                let outcome = self.plugin_set().reconcile(&desired.plugins, report).await?;
                ctx.plugins_changed = outcome.any_changed;
                Ok(())
            }
            Step::Restart => self.restart(&action.key, report).await,
            Step::AutomationUser => match &desired.automation_user {
                Some(user) => {
                    let public_key = self.automation_user_key(&action.key, user).await?;
                    let vars = automation_user_vars(user, &public_key);
                    self.apply_script(action, TemplateId::AutomationUser, &vars, report)
                        .await
                }
                None => {
                    skip(report, &action.key, "not declared");
                    Ok(())
                }
            },
            Step::ResolveSecrets => self.resolve_secrets(&action.key, desired, ctx, report).await,
            Step::Credential(id) => {
                let spec = desired
                    .credentials
                    .iter()
                    .find(|c| c.id == *id)
                    .ok_or_else(|| ReconcileError::SecretResolutionFailed {
                        action: action.key.clone(),
                        message: format!("credential '{id}' is not declared"),
                    })?;
                let secret = ctx.secrets.get(id).ok_or_else(|| ReconcileError::SecretResolutionFailed {
                    action: action.key.clone(),
                    message: format!("secret '{}' was not resolved", spec.secret_ref),
                })?;
                let vars = credential_vars(spec, secret);
                self.apply_script(action, TemplateId::for_credential(spec.kind), &vars, report)
                    .await
            }
            Step::BootstrapJob => match &desired.bootstrap_job {
                Some(job) => {
                    self.apply_script(action, TemplateId::BootstrapJob, &bootstrap_vars(job), report)
                        .await
                }
                None => {
                    skip(report, &action.key, "not declared");
                    Ok(())
                }
            },
            Step::Settings => {
                let vars = settings_vars(desired, &self.options.environment);
                self.apply_script(action, TemplateId::Settings, &vars, report)
                    .await
            }
        }
    }

    async fn prepare_layout(&self, key: &str, report: &mut RunReport) -> Result<(), ReconcileError> {
        let mut created = Vec::new();
        for dir in &self.options.layout_dirs {
            let what = format!("creating {}", dir.display());
            if bounded(self.options.action_timeout, &what, self.fs.ensure_dir(dir))
                .await
                .map_err(|e| ReconcileError::effect(key, &e))?
            {
                created.push(dir.display().to_string());
            }
        }

        if created.is_empty() {
            report.record(key, ActionOutcome::Unchanged, "directories present");
        } else {
            tracing::info!(action = key, outcome = "changed", created = ?created, "directories created");
            report.record(key, ActionOutcome::Changed, format!("created {}", created.join(", ")));
        }
        Ok(())
    }

    /// Safe restart, then poll until the server answers again.
    async fn restart(&self, key: &str, report: &mut RunReport) -> Result<(), ReconcileError> {
        self.reporter.step("restarting server...");
        let script = self
            .templates
            .render(TemplateId::SafeRestart, &json!({}))
            .map_err(|e| ReconcileError::effect(key, &e))?;
        self.execute(key, &script).await?;

        // The server keeps answering while it quiets down; the restart is
        // only done once it has gone away and answered again.
        let deadline = tokio::time::Instant::now() + self.options.restart_timeout;
        let mut went_down = false;
        loop {
            tokio::time::sleep(self.options.poll_interval).await;
            let ready = match bounded(self.options.action_timeout, "health check", self.server.is_ready()).await {
                Ok(ready) => ready,
                Err(e) => {
                    tracing::debug!(action = key, error = %format!("{e:#}"), "server not answering");
                    false
                }
            };
            if !ready {
                went_down = true;
            } else if went_down {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let secs = self.options.restart_timeout.as_secs();
                let message = if went_down {
                    format!("server did not come back within {secs}s")
                } else {
                    format!("server did not go down for the restart within {secs}s")
                };
                return Err(ReconcileError::EffectFailed {
                    action: key.to_string(),
                    message,
                });
            }
        }

        tracing::info!(action = key, outcome = "changed", "server restarted");
        self.reporter.success("server restarted");
        report.record(key, ActionOutcome::Changed, "safe restart completed");
        Ok(())
    }

    /// The user's public key line: inline, or the `public_key` entry of its
    /// secret bag.
    async fn automation_user_key(
        &self,
        key: &str,
        user: &AutomationUser,
    ) -> Result<String, ReconcileError> {
        let Some(bag) = &user.secret_ref else {
            return Ok(user.public_key.clone().unwrap_or_default());
        };
        let what = format!("fetching secret {bag}");
        let secret = bounded(
            self.options.action_timeout,
            &what,
            self.secrets.get_secret(&self.options.environment, bag),
        )
        .await
        .map_err(|e| ReconcileError::secret(key, &e.context(format!("automation user '{}'", user.username))))?;
        if secret.secret.trim().is_empty() {
            return Err(ReconcileError::SecretResolutionFailed {
                action: key.to_string(),
                message: format!("secret bag '{bag}' has an empty public key"),
            });
        }
        Ok(secret.secret)
    }

    /// Fetch every credential's secret. Runs before any credential action so
    /// a missing secret stops the run before anything is registered.
    async fn resolve_secrets(
        &self,
        key: &str,
        desired: &DesiredState,
        ctx: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        for cred in &desired.credentials {
            let what = format!("fetching secret {}", cred.secret_ref);
            let secret = bounded(
                self.options.action_timeout,
                &what,
                self.secrets.get_secret(&self.options.environment, &cred.secret_ref),
            )
            .await
            .map_err(|e| ReconcileError::secret(key, &e.context(format!("credential '{}'", cred.id))))?;
            ctx.secrets.insert(cred.id.clone(), secret);
        }
        tracing::debug!(action = key, count = ctx.secrets.len(), "secrets resolved");
        report.record(
            key,
            ActionOutcome::Unchanged,
            format!("{} secret(s) resolved", ctx.secrets.len()),
        );
        Ok(())
    }

    /// Render `template`, run it, then write the marker named by the guard.
    ///
    /// Digest-guarded actions are skipped when the rendered script hashes to
    /// the digest recorded by the last successful run.
    async fn apply_script(
        &self,
        action: &ActionSpec,
        template: TemplateId,
        vars: &Value,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError> {
        let key = action.key.as_str();
        let script = self
            .templates
            .render(template, vars)
            .map_err(|e| ReconcileError::effect(key, &e))?;
        let digest = sha256_hex(&script);

        if let Guard::UnlessDigestMatches(digest_key) = &action.guard {
            let recorded = bounded(
                self.options.action_timeout,
                "reading digest",
                self.state.get_digest(digest_key),
            )
            .await
            .map_err(|e| ReconcileError::precondition(key, &e))?;
            if recorded.as_deref() == Some(digest.as_str()) {
                skip(report, key, "already satisfied");
                return Ok(());
            }
        }

        self.reporter.step(&format!("applying {key}..."));
        self.execute(key, &script).await?;

        let limit = self.options.action_timeout;
        let marker = match &action.guard {
            Guard::UnlessFlag(flag) => bounded(limit, "writing flag", self.state.set_flag(flag)).await,
            Guard::UnlessDigestMatches(digest_key) => {
                bounded(limit, "writing digest", self.state.set_digest(digest_key, &digest)).await
            }
            Guard::Always | Guard::IfPluginsChanged => Ok(()),
        };
        marker.map_err(|e| ReconcileError::postcondition(key, &e))?;

        tracing::info!(action = key, outcome = "changed", "script applied");
        self.reporter.success(&format!("{key} applied"));
        report.record(key, ActionOutcome::Changed, format!("{} applied", template.name()));
        Ok(())
    }

    async fn execute(&self, key: &str, script: &[u8]) -> Result<(), ReconcileError> {
        let text = String::from_utf8_lossy(script);
        let output = bounded(self.options.action_timeout, "script", self.server.execute(&text))
            .await
            .map_err(|e| ReconcileError::effect(key, &e))?;
        tracing::debug!(action = key, success = output.success, output = %output.output, "script finished");
        if output.success {
            Ok(())
        } else {
            Err(ReconcileError::EffectFailed {
                action: key.to_string(),
                message: format!("script reported failure: {}", output.output.trim()),
            })
        }
    }
}

fn skip(report: &mut RunReport, key: &str, reason: &str) {
    tracing::debug!(action = key, outcome = "skipped", reason, "action skipped");
    report.record(key, ActionOutcome::Skipped, reason);
}
