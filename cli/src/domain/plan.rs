//! The ordered action list for one run.
//!
//! Ordering is fixed: layout, plugins, restart, automation user, credentials,
//! bootstrap job, settings. Later actions depend on state created by earlier
//! ones (scripts reference plugin classes, credentials need the user).

use converge_common::DesiredState;

use crate::domain::keys;

/// What an action does when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Create the base directories on the managed host.
    PrepareLayout,
    /// Converge the plugin set (expands into per-plugin actions).
    Plugins,
    /// Safe restart, then wait for the server to come back.
    Restart,
    AutomationUser,
    /// Fetch every credential's secret before any credential is registered.
    ResolveSecrets,
    Credential(String),
    BootstrapJob,
    Settings,
}

impl Step {
    /// Position in the fixed ordering (1-based).
    #[must_use]
    pub fn stage(&self) -> u8 {
        match self {
            Step::PrepareLayout => 1,
            Step::Plugins => 2,
            Step::Restart => 3,
            Step::AutomationUser => 4,
            Step::ResolveSecrets | Step::Credential(_) => 5,
            Step::BootstrapJob => 6,
            Step::Settings => 7,
        }
    }
}

/// When an action needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    Always,
    /// Run only while the named completion flag is absent.
    UnlessFlag(String),
    /// Run only if a plugin action earlier in this run changed the server.
    IfPluginsChanged,
    /// Run only if the rendered script's digest differs from the recorded one.
    UnlessDigestMatches(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub key: String,
    pub step: Step,
    pub guard: Guard,
}

impl ActionSpec {
    fn new(key: impl Into<String>, step: Step, guard: Guard) -> Self {
        Self {
            key: key.into(),
            step,
            guard,
        }
    }
}

/// Build the action list for `desired`.
///
/// Blocks absent from the document produce no actions. The plugin step is
/// always present so that stale pins get cleaned up even when no plugin is
/// desired any more.
#[must_use]
pub fn build_plan(desired: &DesiredState) -> Vec<ActionSpec> {
    let mut plan = vec![
        ActionSpec::new(keys::PREPARE_LAYOUT, Step::PrepareLayout, Guard::Always),
        ActionSpec::new(keys::PLUGINS, Step::Plugins, Guard::Always),
        ActionSpec::new(keys::RESTART, Step::Restart, Guard::IfPluginsChanged),
    ];

    if desired.automation_user.is_some() {
        plan.push(ActionSpec::new(
            keys::AUTOMATION_USER_CREATED,
            Step::AutomationUser,
            Guard::UnlessFlag(keys::AUTOMATION_USER_CREATED.to_string()),
        ));
    }

    if !desired.credentials.is_empty() {
        plan.push(ActionSpec::new(
            keys::RESOLVE_SECRETS,
            Step::ResolveSecrets,
            Guard::Always,
        ));
        for cred in &desired.credentials {
            let key = keys::credential_key(&cred.id);
            plan.push(ActionSpec::new(
                key.clone(),
                Step::Credential(cred.id.clone()),
                Guard::UnlessDigestMatches(key),
            ));
        }
    }

    if desired.bootstrap_job.is_some() {
        plan.push(ActionSpec::new(
            keys::BOOTSTRAP_JOB,
            Step::BootstrapJob,
            Guard::UnlessDigestMatches(keys::BOOTSTRAP_JOB.to_string()),
        ));
    }

    if !desired.settings.is_empty() {
        plan.push(ActionSpec::new(
            keys::SETTINGS,
            Step::Settings,
            Guard::UnlessDigestMatches(keys::SETTINGS.to_string()),
        ));
    }

    plan
}
