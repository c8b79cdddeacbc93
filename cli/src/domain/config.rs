//! Domain types and validators for the tool's own configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "environment",
    "server.url",
    "server.home",
    "server.cli_jar",
    "server.java",
    "server.identity_file",
    "state.dir",
    "secrets.dir",
    "timeouts.action_secs",
    "timeouts.restart_secs",
    "timeouts.poll_secs",
    "manifest.path",
];

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.converge/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Environment name: selects the secret bag directory and appears in
    /// the server's system message.
    pub environment: String,
    pub server: ServerConfig,
    pub state: StateConfig,
    pub layout: LayoutConfig,
    pub secrets: SecretsConfig,
    pub timeouts: TimeoutConfig,
    pub manifest: ManifestConfig,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            environment: "_default".to_string(),
            server: ServerConfig::default(),
            state: StateConfig::default(),
            layout: LayoutConfig::default(),
            secrets: SecretsConfig::default(),
            timeouts: TimeoutConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

/// How to reach the managed server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub url: String,
    /// Server home directory on this host.
    pub home: PathBuf,
    /// Path to `jenkins-cli.jar`. Defaults to `<home>/jenkins-cli.jar`.
    pub cli_jar: Option<PathBuf>,
    pub java: String,
    /// Private key passed to the CLI with `-i`.
    pub identity_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/".to_string(),
            home: PathBuf::from("/var/lib/jenkins"),
            cli_jar: None,
            java: "java".to_string(),
            identity_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding flags, pins and digests. Defaults to `<home>/.flags`.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directories created by the first action. Defaults to the state
    /// directory and `<home>/init.groovy.d`.
    pub directories: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Root of the secret bags: `<dir>/<environment>/<bag>.json`.
    pub dir: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/etc/converge/secrets"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for any single collaborator call.
    pub action_secs: u64,
    /// How long to wait for the server to come back after a restart.
    pub restart_secs: u64,
    pub poll_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            action_secs: 600,
            restart_secs: 300,
            poll_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Where to render the plugin dependency manifest. Disabled when unset.
    pub path: Option<PathBuf>,
}

impl ConvergeConfig {
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state
            .dir
            .clone()
            .unwrap_or_else(|| self.server.home.join(".flags"))
    }

    #[must_use]
    pub fn cli_jar(&self) -> PathBuf {
        self.server
            .cli_jar
            .clone()
            .unwrap_or_else(|| self.server.home.join("jenkins-cli.jar"))
    }

    #[must_use]
    pub fn layout_dirs(&self) -> Vec<PathBuf> {
        self.layout.directories.clone().unwrap_or_else(|| {
            vec![self.state_dir(), self.server.home.join("init.groovy.d")]
        })
    }

    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.action_secs)
    }

    #[must_use]
    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.restart_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timeouts.poll_secs.max(1))
    }

    /// Validate and set a single dotted key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;
        match key {
            "environment" => self.environment = value.to_string(),
            "server.url" => self.server.url = value.to_string(),
            "server.home" => self.server.home = PathBuf::from(value),
            "server.cli_jar" => self.server.cli_jar = Some(PathBuf::from(value)),
            "server.java" => self.server.java = value.to_string(),
            "server.identity_file" => self.server.identity_file = Some(PathBuf::from(value)),
            "state.dir" => self.state.dir = Some(PathBuf::from(value)),
            "secrets.dir" => self.secrets.dir = PathBuf::from(value),
            "timeouts.action_secs" => self.timeouts.action_secs = parse_secs(key, value)?,
            "timeouts.restart_secs" => self.timeouts.restart_secs = parse_secs(key, value)?,
            "timeouts.poll_secs" => self.timeouts.poll_secs = parse_secs(key, value)?,
            "manifest.path" => self.manifest.path = Some(PathBuf::from(value)),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                    valid: VALID_CONFIG_KEYS.join(", "),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a whole number of seconds".to_string(),
        }
        .into()
    })
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let invalid = |reason: &str| -> anyhow::Error {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };
    if value.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    match key {
        "server.url" if !(value.starts_with("http://") || value.starts_with("https://")) => {
            Err(invalid("must start with http:// or https://"))
        }
        k if k.starts_with("timeouts.") => match value.parse::<u64>() {
            Ok(0) => Err(invalid("must be greater than zero")),
            Ok(_) => Ok(()),
            Err(_) => Err(invalid("expected a whole number of seconds")),
        },
        "environment"
            if !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')) =>
        {
            Err(invalid("use letters, digits, '_' or '-'"))
        }
        _ => Ok(()),
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
