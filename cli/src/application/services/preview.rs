//! Application service: read-only preview of a run.
//!
//! Evaluates every guard against the current state without applying any
//! effect or writing any marker.

use converge_common::DesiredState;
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{
    HostFs, ManagedServer, ProgressReporter, SecretStore, StateStore, TemplateRenderer,
};
use crate::application::services::bounded;
use crate::application::services::reconcile::Reconciler;
use crate::domain::digest::sha256_hex;
use crate::domain::templates::{bootstrap_vars, settings_vars};
use crate::domain::{ActionSpec, Guard, PluginAction, ReconcileError, Step, TemplateId, build_plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The guard says the effect would run.
    Apply,
    /// The guard says the action is already satisfied.
    Satisfied,
    /// Cannot be decided before earlier actions run.
    Conditional,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedAction {
    pub key: String,
    pub stage: u8,
    pub verdict: Verdict,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub actions: Vec<PlannedAction>,
    /// Plugin steps in execution order, as human descriptions.
    pub plugin_steps: Vec<String>,
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
    /// Describe what `reconcile(desired)` would do right now.
    ///
    /// # Errors
    ///
    /// Returns the error of the first guard that cannot be evaluated.
    pub async fn preview(&self, desired: &DesiredState) -> Result<Preview, ReconcileError> {
        let plugin_plan = self.plugin_set().plan(&desired.plugins).await?;
        let installs = plugin_plan.steps().any(|s| {
            matches!(
                s,
                PluginAction::InstallPinned { .. } | PluginAction::InstallUnpinned { .. }
            )
        });

        let mut actions = Vec::new();
        for action in build_plan(desired) {
            let (verdict, detail) = self.verdict(&action, desired, plugin_plan.is_noop(), installs).await?;
            actions.push(PlannedAction {
                key: action.key.clone(),
                stage: action.step.stage(),
                verdict,
                detail,
            });
        }

        Ok(Preview {
            actions,
            plugin_steps: plugin_plan.steps().map(PluginAction::describe).collect(),
        })
    }

    async fn verdict(
        &self,
        action: &ActionSpec,
        desired: &DesiredState,
        plugins_noop: bool,
        installs: bool,
    ) -> Result<(Verdict, String), ReconcileError> {
        let key = action.key.as_str();
        if let Guard::UnlessFlag(flag) = &action.guard {
            let done = bounded(self.options.action_timeout, "reading flag", self.state.get_flag(flag))
                .await
                .map_err(|e| ReconcileError::precondition(key, &e))?;
            return Ok(if done {
                (Verdict::Satisfied, format!("flag {flag} present"))
            } else {
                (Verdict::Apply, format!("flag {flag} absent"))
            });
        }

        Ok(match &action.step {
            Step::PrepareLayout => (
                Verdict::Apply,
                format!("ensure {} directories", self.options.layout_dirs.len()),
            ),
            Step::Plugins if plugins_noop => (Verdict::Satisfied, "plugin set converged".into()),
            Step::Plugins => (Verdict::Apply, "plugin changes pending".into()),
            Step::Restart if installs => (
                Verdict::Conditional,
                "runs if a plugin install changes the server".into(),
            ),
            Step::Restart => (Verdict::Satisfied, "no plugin install pending".into()),
            Step::ResolveSecrets => (
                Verdict::Apply,
                format!("{} secret(s) to fetch", desired.credentials.len()),
            ),
            Step::Credential(_) => (
                Verdict::Conditional,
                "compared after secrets are resolved".into(),
            ),
            Step::AutomationUser => (Verdict::Apply, "create automation user".into()),
            Step::BootstrapJob => match &desired.bootstrap_job {
                Some(job) => {
                    self.digest_verdict(action, TemplateId::BootstrapJob, &bootstrap_vars(job))
                        .await?
                }
                None => (Verdict::Satisfied, "not declared".into()),
            },
            Step::Settings => {
                let vars = settings_vars(desired, &self.options.environment);
                self.digest_verdict(action, TemplateId::Settings, &vars).await?
            }
        })
    }

    async fn digest_verdict(
        &self,
        action: &ActionSpec,
        template: TemplateId,
        vars: &Value,
    ) -> Result<(Verdict, String), ReconcileError> {
        let key = action.key.as_str();
        let Guard::UnlessDigestMatches(digest_key) = &action.guard else {
            return Ok((Verdict::Apply, "always applied".into()));
        };
        let script = self
            .templates
            .render(template, vars)
            .map_err(|e| ReconcileError::effect(key, &e))?;
        let recorded = bounded(
            self.options.action_timeout,
            "reading digest",
            self.state.get_digest(digest_key),
        )
        .await
        .map_err(|e| ReconcileError::precondition(key, &e))?;

        Ok(if recorded.as_deref() == Some(sha256_hex(&script).as_str()) {
            (Verdict::Satisfied, "rendered script unchanged".into())
        } else {
            (Verdict::Apply, "rendered script differs from last run".into())
        })
    }
}
