//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and `converge_common`, never
//! from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;
use converge_common::{CompletionFlag, PinRecord, SecretRecord};
use serde_json::Value;

use crate::domain::{ConvergeConfig, InstalledPlugin, TemplateId};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Result of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOutcome {
    /// `true` when the installed set or a version actually changed.
    pub changed: bool,
}

/// Result of running an administrative script on the managed server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub success: bool,
    /// Combined output, for logging only.
    pub output: String,
}

// ── State Store Port ──────────────────────────────────────────────────────────

/// Durable record of what this tool has done to the managed server.
///
/// The store does not claim exclusive control of the server: it only
/// records this tool's own actions. Callers check live state through the
/// installer where that matters.
#[allow(async_fn_in_trait)]
pub trait StateStore {
    /// `true` if the completion flag (or pin marker) `key` exists.
    async fn get_flag(&self, key: &str) -> Result<bool>;
    /// Record a completion flag. An existing flag is left untouched.
    async fn set_flag(&self, key: &str) -> Result<()>;
    /// Every completion flag, excluding pin markers.
    async fn list_flags(&self) -> Result<Vec<CompletionFlag>>;
    async fn get_pin(&self, name: &str) -> Result<Option<PinRecord>>;
    async fn set_pin(&self, name: &str, version: &str) -> Result<()>;
    /// Remove a pin. Removing a missing pin is not an error.
    async fn delete_pin(&self, name: &str) -> Result<()>;
    async fn list_pins(&self) -> Result<Vec<PinRecord>>;
    /// Content digest recorded after the last successful apply of `key`.
    async fn get_digest(&self, key: &str) -> Result<Option<String>>;
    async fn set_digest(&self, key: &str, digest: &str) -> Result<()>;
}

// ── Managed Server Ports ──────────────────────────────────────────────────────

/// Installs plugins on the managed server and reports what is installed.
#[allow(async_fn_in_trait)]
pub trait PluginInstaller {
    /// Install `name`, at `version` when given, latest otherwise.
    async fn install(&self, name: &str, version: Option<&str>) -> Result<InstallOutcome>;
    /// Live install state: `None` when the plugin is not installed.
    async fn installed(&self, name: &str) -> Result<Option<InstalledPlugin>>;
}

/// Executes opaque administrative scripts against the managed server.
#[allow(async_fn_in_trait)]
pub trait ScriptRunner {
    async fn execute(&self, script: &str) -> Result<ScriptOutput>;
}

/// Answers whether the managed server is up and accepting requests.
#[allow(async_fn_in_trait)]
pub trait ServerHealth {
    async fn is_ready(&self) -> Result<bool>;
}

/// Composite trait: any type implementing all three sub-traits is a `ManagedServer`.
pub trait ManagedServer: PluginInstaller + ScriptRunner + ServerHealth {}

/// Blanket implementation: any type implementing all three sub-traits is a `ManagedServer`.
impl<T> ManagedServer for T where T: PluginInstaller + ScriptRunner + ServerHealth {}

// ── Templating and Secrets Ports ──────────────────────────────────────────────

/// Renders a named template with JSON variables.
pub trait TemplateRenderer {
    fn render(&self, template: TemplateId, vars: &Value) -> Result<Vec<u8>>;
}

/// Supplies secret material; the tool never generates or stores secrets.
#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn get_secret(&self, environment: &str, bag_id: &str) -> Result<SecretRecord>;
}

// ── Host Filesystem Port ──────────────────────────────────────────────────────

/// Filesystem operations on the managed host.
#[allow(async_fn_in_trait)]
pub trait HostFs {
    /// Create `path` and its parents. Returns `true` if anything was created.
    async fn ensure_dir(&self, path: &Path) -> Result<bool>;
    /// Atomically write `content` unless the file already holds exactly it.
    /// Returns `true` if the file was written.
    async fn write_if_changed(&self, path: &Path, content: &[u8]) -> Result<bool>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait; no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Config Port ───────────────────────────────────────────────────────────────

/// Abstracts loading and saving the tool configuration.
pub trait ConfigStore {
    /// Load the configuration, falling back to defaults when no file exists.
    fn load(&self) -> Result<ConvergeConfig>;
    fn save(&self, config: &ConvergeConfig) -> Result<()>;
    /// Path of the configuration file in use.
    fn path(&self) -> Result<PathBuf>;
}
