//! Stable action keys.
//!
//! Keys name report entries and, for one-time actions, the marker files in
//! the state directory. They must stay stable across releases.

pub const PREPARE_LAYOUT: &str = "prepare_layout";
pub const PLUGINS: &str = "plugins";
pub const PLUGIN_MANIFEST: &str = "plugin_manifest";
pub const RESTART: &str = "restart";
pub const AUTOMATION_USER_CREATED: &str = "automation_user_created";
pub const RESOLVE_SECRETS: &str = "resolve_credential_secrets";
pub const BOOTSTRAP_JOB: &str = "bootstrap_job";
pub const SETTINGS: &str = "settings";

/// Marker key for a plugin's pin record, e.g. `git_pinned`.
#[must_use]
pub fn pin_key(plugin: &str) -> String {
    format!("{plugin}_pinned")
}

/// Report key for installing a plugin, e.g. `plugin_git`.
#[must_use]
pub fn plugin_key(plugin: &str) -> String {
    format!("plugin_{plugin}")
}

/// Report and digest key for registering a credential.
#[must_use]
pub fn credential_key(id: &str) -> String {
    format!("credential_{id}")
}

/// Inverse of [`pin_key`].
#[must_use]
pub fn plugin_from_pin_key(key: &str) -> Option<&str> {
    key.strip_suffix("_pinned").filter(|name| !name.is_empty())
}
