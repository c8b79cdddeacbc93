//! Records persisted by the state store, and secret material handed in by
//! the secret collaborator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pinned-version record for one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub plugin_name: String,
    pub version: String,
    #[serde(default = "default_pinned")]
    pub pinned: bool,
}

impl PinRecord {
    #[must_use]
    pub fn new(plugin_name: &str, version: &str) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            version: version.to_string(),
            pinned: true,
        }
    }
}

fn default_pinned() -> bool {
    true
}

/// Durable marker that a one-time action has completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionFlag {
    pub action_key: String,
    pub completed_at: DateTime<Utc>,
}

/// Secret material resolved from the secret store.
///
/// `secret` holds a PEM private key or a password, depending on the
/// credential kind, or the automation user's public key line. `Debug` never
/// prints it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SecretRecord {
    #[serde(default)]
    pub username: String,
    #[serde(alias = "private_key", alias = "password", alias = "public_key")]
    pub secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("description", &self.description)
            .finish()
    }
}
