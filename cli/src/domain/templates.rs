//! Template identifiers and the variables each template is rendered with.
//!
//! Rendered output is opaque to the reconciler: it is hashed, handed to the
//! script runner or written to disk, never parsed.

use std::collections::BTreeMap;

use converge_common::{
    AutomationUser, BootstrapJob, CredentialKind, CredentialSpec, DesiredState, SecretRecord,
    SettingKey,
};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    PluginManifest,
    SafeRestart,
    AutomationUser,
    PrivateKeyCredential,
    PasswordCredential,
    BootstrapJob,
    Settings,
}

impl TemplateId {
    pub const ALL: [TemplateId; 7] = [
        TemplateId::PluginManifest,
        TemplateId::SafeRestart,
        TemplateId::AutomationUser,
        TemplateId::PrivateKeyCredential,
        TemplateId::PasswordCredential,
        TemplateId::BootstrapJob,
        TemplateId::Settings,
    ];

    /// Registered template name; the embedded file is `<name>.hbs`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TemplateId::PluginManifest => "plugin_manifest",
            TemplateId::SafeRestart => "safe_restart",
            TemplateId::AutomationUser => "automation_user",
            TemplateId::PrivateKeyCredential => "credential_private_key",
            TemplateId::PasswordCredential => "credential_password",
            TemplateId::BootstrapJob => "bootstrap_job",
            TemplateId::Settings => "settings",
        }
    }

    #[must_use]
    pub fn for_credential(kind: CredentialKind) -> Self {
        match kind {
            CredentialKind::PrivateKey => TemplateId::PrivateKeyCredential,
            CredentialKind::Password => TemplateId::PasswordCredential,
        }
    }
}

/// Escape a value for a single-quoted Groovy (or Gradle) string literal.
#[must_use]
pub fn groovy_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[must_use]
pub fn manifest_vars(plugins: &BTreeMap<String, Option<String>>) -> Value {
    let entries: Vec<Value> = plugins
        .iter()
        .map(|(name, version)| json!({ "name": name, "version": version }))
        .collect();
    json!({ "plugins": entries })
}

/// `public_key` is the resolved key line, inline or from the secret store.
#[must_use]
pub fn automation_user_vars(user: &AutomationUser, public_key: &str) -> Value {
    json!({
        "username": user.username,
        "full_name": user.full_name,
        "public_key": public_key.trim(),
    })
}

#[must_use]
pub fn credential_vars(spec: &CredentialSpec, secret: &SecretRecord) -> Value {
    let description = if spec.description.is_empty() {
        secret.description.clone().unwrap_or_default()
    } else {
        spec.description.clone()
    };
    json!({
        "id": spec.id,
        "username": spec.username,
        "description": description,
        "secret": secret.secret,
        "passphrase": secret.passphrase.clone().unwrap_or_default(),
    })
}

#[must_use]
pub fn bootstrap_vars(job: &BootstrapJob) -> Value {
    json!({
        "name": job.name,
        "repository": job.repository,
        "branch": job.branch,
        "script_path": job.script_path,
        "schedule": job.schedule,
        "credential_id": job.credential_id.clone().unwrap_or_default(),
    })
}

/// Variables for the settings script. Absent settings render as empty
/// strings, which the template treats as "leave unchanged".
#[must_use]
pub fn settings_vars(desired: &DesiredState, environment: &str) -> Value {
    let text = |key| desired.setting_text(key).unwrap_or_default();
    json!({
        "environment": environment,
        "environment_title": capitalize(environment),
        "executor_count": desired.executor_count().map(|n| n.to_string()).unwrap_or_default(),
        "system_email": text(SettingKey::SystemEmail),
        "system_url": text(SettingKey::SystemUrl),
        "sshd_port": desired.sshd_port().map(|p| p.to_string()).unwrap_or_default(),
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
