//! The desired-state document: what the managed CI server should look like.
//!
//! A `DesiredState` is loaded and validated once, before any action runs.
//! Nothing inside the reconciler reads configuration from anywhere else.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Validation failures for a desired-state document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DesiredStateError {
    #[error("invalid plugin name '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidPluginName(String),

    #[error("plugin '{0}' is declared more than once")]
    DuplicatePlugin(String),

    #[error("plugin '{name}' has an empty version; omit it or use ~ for latest")]
    EmptyVersion { name: String },

    #[error("invalid credential id '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidCredentialId(String),

    #[error("credential id '{0}' is declared more than once")]
    DuplicateCredential(String),

    #[error("credential '{id}' has an empty {field}")]
    EmptyCredentialField { id: String, field: &'static str },

    #[error("invalid value for {key}: {value} ({reason})")]
    InvalidSetting {
        key: SettingKey,
        value: String,
        reason: &'static str,
    },

    #[error("automation user has an empty {0}")]
    EmptyAutomationUserField(&'static str),

    #[error("automation user needs exactly one of public_key or secret_ref")]
    AutomationUserKeySource,

    #[error("bootstrap job has an empty {0}")]
    EmptyBootstrapField(&'static str),
}

/// Top-level input to a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredState {
    /// Plugin name -> optional pinned version. `None` means any/latest.
    #[serde(default, deserialize_with = "deserialize_plugins")]
    pub plugins: BTreeMap<String, Option<String>>,

    #[serde(default)]
    pub settings: BTreeMap<SettingKey, SettingValue>,

    #[serde(default)]
    pub credentials: Vec<CredentialSpec>,

    #[serde(default)]
    pub automation_user: Option<AutomationUser>,

    #[serde(default)]
    pub bootstrap_job: Option<BootstrapJob>,
}

/// Server-wide settings the reconciler knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    ExecutorCount,
    SystemEmail,
    SystemUrl,
    SshdPort,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ExecutorCount,
        SettingKey::SystemEmail,
        SettingKey::SystemUrl,
        SettingKey::SshdPort,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::ExecutorCount => "executor_count",
            SettingKey::SystemEmail => "system_email",
            SettingKey::SystemUrl => "system_url",
            SettingKey::SshdPort => "sshd_port",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setting value as written in the document (`4` and `"4"` are both accepted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(u64),
    Text(String),
}

impl SettingValue {
    /// Parse the value as an unsigned integer, whichever form it was written in.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            SettingValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Number(n) => write!(f, "{n}"),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

/// Kind of credential registered on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    PrivateKey,
    Password,
}

/// A named credential. The secret itself is looked up by `secret_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialSpec {
    pub id: String,
    pub kind: CredentialKind,
    pub username: String,
    pub secret_ref: String,
    #[serde(default)]
    pub description: String,
}

/// The service account the tool itself uses against the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationUser {
    pub username: String,
    /// OpenSSH public key line, e.g. `ssh-rsa AAAA...`.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Secret bag whose `public_key` entry holds the key line instead.
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default = "default_full_name")]
    pub full_name: String,
}

/// Seed job that pulls job definitions from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapJob {
    #[serde(default = "default_job_name")]
    pub name: String,
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub script_path: String,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default)]
    pub credential_id: Option<String>,
}

fn default_full_name() -> String {
    "Automation Account".to_string()
}

fn default_job_name() -> String {
    "dsl-bootstrap-job".to_string()
}

fn default_branch() -> String {
    "*/master".to_string()
}

fn default_schedule() -> String {
    "H H * * *".to_string()
}

/// Plugin entries may be written as `~`, `true` (both: any version) or a version string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PluginEntry {
    Latest(Option<bool>),
    Pinned(String),
}

/// Builds the plugin map entry by entry so a repeated name is an error
/// rather than a silent overwrite.
struct PluginsVisitor;

impl<'de> Visitor<'de> for PluginsVisitor {
    type Value = BTreeMap<String, Option<String>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of plugin names to versions")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(BTreeMap::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut plugins = BTreeMap::new();
        while let Some((name, entry)) = map.next_entry::<String, PluginEntry>()? {
            let version = match entry {
                PluginEntry::Latest(None | Some(true)) => None,
                PluginEntry::Latest(Some(false)) => {
                    return Err(de::Error::custom(format!(
                        "plugin '{name}': `false` is not a version; remove the entry instead"
                    )));
                }
                PluginEntry::Pinned(version) => Some(version),
            };
            if plugins.contains_key(&name) {
                return Err(de::Error::custom(DesiredStateError::DuplicatePlugin(name)));
            }
            plugins.insert(name, version);
        }
        Ok(plugins)
    }
}

fn deserialize_plugins<'de, D>(deserializer: D) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(PluginsVisitor)
}

/// Returns `true` when `s` is usable as a plugin name or credential id.
///
/// These end up in marker file names, so the alphabet is kept narrow.
#[must_use]
pub fn validate_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl DesiredState {
    /// Check every invariant of the document.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), DesiredStateError> {
        for (name, version) in &self.plugins {
            if !validate_identifier(name) {
                return Err(DesiredStateError::InvalidPluginName(name.clone()));
            }
            if version.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(DesiredStateError::EmptyVersion { name: name.clone() });
            }
        }

        for (key, value) in &self.settings {
            validate_setting(*key, value)?;
        }

        let mut seen = HashSet::new();
        for cred in &self.credentials {
            if !validate_identifier(&cred.id) {
                return Err(DesiredStateError::InvalidCredentialId(cred.id.clone()));
            }
            if !seen.insert(cred.id.as_str()) {
                return Err(DesiredStateError::DuplicateCredential(cred.id.clone()));
            }
            for (field, value) in [("username", &cred.username), ("secret_ref", &cred.secret_ref)] {
                if value.trim().is_empty() {
                    return Err(DesiredStateError::EmptyCredentialField {
                        id: cred.id.clone(),
                        field,
                    });
                }
            }
        }

        if let Some(user) = &self.automation_user {
            if user.username.trim().is_empty() {
                return Err(DesiredStateError::EmptyAutomationUserField("username"));
            }
            match (&user.public_key, &user.secret_ref) {
                (Some(key), None) if key.trim().is_empty() => {
                    return Err(DesiredStateError::EmptyAutomationUserField("public_key"));
                }
                (None, Some(bag)) if bag.trim().is_empty() => {
                    return Err(DesiredStateError::EmptyAutomationUserField("secret_ref"));
                }
                (Some(_), None) | (None, Some(_)) => {}
                _ => return Err(DesiredStateError::AutomationUserKeySource),
            }
        }

        if let Some(job) = &self.bootstrap_job {
            for (field, value) in [
                ("name", &job.name),
                ("repository", &job.repository),
                ("script_path", &job.script_path),
            ] {
                if value.trim().is_empty() {
                    return Err(DesiredStateError::EmptyBootstrapField(field));
                }
            }
        }

        Ok(())
    }

    /// Typed executor count, if set and valid.
    #[must_use]
    pub fn executor_count(&self) -> Option<u64> {
        self.settings.get(&SettingKey::ExecutorCount)?.as_u64()
    }

    /// Typed SSHD port, if set and valid.
    #[must_use]
    pub fn sshd_port(&self) -> Option<u16> {
        let port = self.settings.get(&SettingKey::SshdPort)?.as_u64()?;
        u16::try_from(port).ok()
    }

    #[must_use]
    pub fn setting_text(&self, key: SettingKey) -> Option<String> {
        self.settings.get(&key).map(ToString::to_string)
    }
}

fn validate_setting(key: SettingKey, value: &SettingValue) -> Result<(), DesiredStateError> {
    let invalid = |reason| DesiredStateError::InvalidSetting {
        key,
        value: value.to_string(),
        reason,
    };
    match key {
        SettingKey::ExecutorCount => match value.as_u64() {
            Some(n) if n <= 1024 => Ok(()),
            Some(_) => Err(invalid("must be at most 1024")),
            None => Err(invalid("must be a non-negative integer")),
        },
        SettingKey::SshdPort => match value.as_u64() {
            Some(n) if (1..=65535).contains(&n) => Ok(()),
            _ => Err(invalid("must be a port number between 1 and 65535")),
        },
        SettingKey::SystemEmail => {
            let text = value.to_string();
            match text.split_once('@') {
                Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
                _ => Err(invalid("must be an e-mail address")),
            }
        }
        SettingKey::SystemUrl => {
            let text = value.to_string();
            if text.starts_with("http://") || text.starts_with("https://") {
                Ok(())
            } else {
                Err(invalid("must start with http:// or https://"))
            }
        }
    }
}
