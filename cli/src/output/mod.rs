//! Output formatting module

pub mod human;
pub mod json;
pub mod reporter;
pub mod styles;

use std::path::Path;

use anyhow::Result;
use console::Term;
use converge_common::{CompletionFlag, DesiredState, PinRecord, RunReport};
use owo_colors::OwoColorize as _;

pub use human::HumanRenderer;
pub use json::JsonRenderer;
pub use reporter::{Reporter, SilentReporter, TerminalReporter};
pub use styles::Styles;

use crate::application::services::preview::Preview;
use crate::domain::ConvergeConfig;

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print a warning message prefixed with `⚠`. Suppressed when `quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// Print an info message prefixed with `ℹ`. Suppressed when `quiet`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Print a section header. Suppressed when `quiet`.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Print a key-value pair with the key dimmed. Suppressed when `quiet`.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

/// Dispatches rendering to the human or JSON renderer.
pub enum Renderer<'a> {
    Human(HumanRenderer<'a>),
    Json(JsonRenderer),
}

impl Renderer<'_> {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_report(&self, report: &RunReport) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_report(report);
                Ok(())
            }
            Renderer::Json(r) => r.render(report),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_preview(&self, preview: &Preview) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_preview(preview);
                Ok(())
            }
            Renderer::Json(r) => r.render(preview),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_state(&self, dir: &Path, flags: &[CompletionFlag], pins: &[PinRecord]) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_state(dir, flags, pins);
                Ok(())
            }
            Renderer::Json(r) => r.render(&serde_json::json!({
                "state_dir": dir,
                "flags": flags,
                "pins": pins,
            })),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_validated(&self, path: &Path, desired: &DesiredState) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_validated(path, desired);
                Ok(())
            }
            Renderer::Json(r) => r.render(&serde_json::json!({
                "valid": true,
                "path": path,
                "plugins": desired.plugins.len(),
                "settings": desired.settings.len(),
                "credentials": desired.credentials.len(),
                "automation_user": desired.automation_user.is_some(),
                "bootstrap_job": desired.bootstrap_job.is_some(),
            })),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(&self, path: &Path, config: &ConvergeConfig) -> Result<()> {
        match self {
            Renderer::Human(r) => r.render_config(path, config),
            Renderer::Json(r) => r.render(&serde_json::json!({
                "path": path,
                "config": config,
            })),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config_path(&self, path: &Path) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_config_path(path);
                Ok(())
            }
            Renderer::Json(r) => r.render(&serde_json::json!({ "path": path })),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        match self {
            Renderer::Human(r) => {
                r.render_version(version);
                Ok(())
            }
            Renderer::Json(r) => r.render(&serde_json::json!({ "version": version })),
        }
    }
}
