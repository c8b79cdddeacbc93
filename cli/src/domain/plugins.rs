//! Plugin-set planning.
//!
//! Pure function from (desired set, current pins + live install state) to an
//! ordered list of plugin actions. Executing the plan is the job of
//! `application::services::plugin_set`.

use std::collections::BTreeMap;

use converge_common::PinRecord;

use crate::domain::keys::{pin_key, plugin_key};

/// What the installer reports about a plugin on the managed system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    pub version: Option<String>,
}

/// Everything known about one plugin before planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentPlugin {
    /// Pin recorded by a previous run, if any.
    pub pin: Option<PinRecord>,
    /// Live install state, if the plugin is installed.
    pub installed: Option<InstalledPlugin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAction {
    /// Delete a pin that no longer matches the desired state.
    RemovePin { name: String },
    InstallUnpinned { name: String },
    InstallPinned { name: String, version: String },
    WritePin { name: String, version: String },
    NoOp { name: String },
}

impl PluginAction {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::RemovePin { name }
            | Self::InstallUnpinned { name }
            | Self::InstallPinned { name, .. }
            | Self::WritePin { name, .. }
            | Self::NoOp { name } => name,
        }
    }

    /// Report key: pin actions use the pin marker key, the rest the plugin key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::RemovePin { name } | Self::WritePin { name, .. } => pin_key(name),
            Self::InstallUnpinned { name }
            | Self::InstallPinned { name, .. }
            | Self::NoOp { name } => plugin_key(name),
        }
    }

    /// Short human description, used by `plan` and the run report.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RemovePin { name } => format!("remove pin for {name}"),
            Self::InstallUnpinned { name } => format!("install {name} (latest)"),
            Self::InstallPinned { name, version } => format!("install {name} {version}"),
            Self::WritePin { name, version } => format!("pin {name} at {version}"),
            Self::NoOp { name } => format!("{name} already satisfied"),
        }
    }
}

/// Output of [`reconcile_plugins`]. `cleanup` always runs before `actions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginPlan {
    pub cleanup: Vec<PluginAction>,
    pub actions: Vec<PluginAction>,
}

impl PluginPlan {
    /// Cleanup followed by the per-plugin actions, in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &PluginAction> {
        self.cleanup.iter().chain(self.actions.iter())
    }

    /// `true` when executing the plan cannot change anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.steps().all(|a| matches!(a, PluginAction::NoOp { .. }))
    }
}

/// Compute the plugin actions needed to converge `current` onto `desired`.
///
/// `current` may contain plugins that are not desired; their pins are removed
/// but the plugins themselves are left installed. Desired plugins are
/// processed in lexicographic order.
#[must_use]
pub fn reconcile_plugins(
    desired: &BTreeMap<String, Option<String>>,
    current: &BTreeMap<String, CurrentPlugin>,
) -> PluginPlan {
    let mut plan = PluginPlan::default();

    for (name, cur) in current {
        if cur.pin.is_some() && !desired.contains_key(name) {
            plan.cleanup.push(PluginAction::RemovePin { name: name.clone() });
        }
    }

    let none = CurrentPlugin::default();
    for (name, wanted) in desired {
        let cur = current.get(name).unwrap_or(&none);
        match wanted {
            None => {
                if cur.pin.is_some() {
                    plan.cleanup.push(PluginAction::RemovePin { name: name.clone() });
                }
                if cur.installed.is_some() {
                    plan.actions.push(PluginAction::NoOp { name: name.clone() });
                } else {
                    plan.actions
                        .push(PluginAction::InstallUnpinned { name: name.clone() });
                }
            }
            Some(version) => match &cur.pin {
                Some(pin) if pin.version == *version => {
                    // Pin is right; reinstall if the plugin went missing or the
                    // live version drifted. An unknown live version counts as a match.
                    let live_matches = match &cur.installed {
                        Some(InstalledPlugin { version: Some(live) }) => live == version,
                        Some(InstalledPlugin { version: None }) => true,
                        None => false,
                    };
                    if live_matches {
                        plan.actions.push(PluginAction::NoOp { name: name.clone() });
                    } else {
                        plan.actions.push(PluginAction::InstallPinned {
                            name: name.clone(),
                            version: version.clone(),
                        });
                    }
                }
                stale => {
                    if stale.is_some() {
                        plan.cleanup.push(PluginAction::RemovePin { name: name.clone() });
                    }
                    plan.actions.push(PluginAction::InstallPinned {
                        name: name.clone(),
                        version: version.clone(),
                    });
                    plan.actions.push(PluginAction::WritePin {
                        name: name.clone(),
                        version: version.clone(),
                    });
                }
            },
        }
    }

    plan
}
