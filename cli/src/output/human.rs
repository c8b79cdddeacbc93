//! Human-readable terminal renderer.

use std::path::Path;

use anyhow::{Context, Result};
use converge_common::{ActionOutcome, CompletionFlag, DesiredState, PinRecord, RunReport};
use owo_colors::OwoColorize as _;

use crate::application::services::preview::{Preview, Verdict};
use crate::domain::ConvergeConfig;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    pub fn render_version(&self, version: &str) {
        self.ctx.info(&format!("converge v{version}"));
    }

    /// Per-action outcome lines, then a summary or the failure.
    pub fn render_report(&self, report: &RunReport) {
        let width = report.actions.iter().map(|a| a.key.len()).max().unwrap_or(0);
        if !self.ctx.quiet {
            println!();
            for action in &report.actions {
                let (glyph, style) = match action.outcome {
                    ActionOutcome::Changed => ("✓", self.ctx.styles.success),
                    ActionOutcome::Unchanged => ("=", self.ctx.styles.dim),
                    ActionOutcome::Skipped => ("·", self.ctx.styles.dim),
                };
                println!(
                    "  {} {:<width$}  {}",
                    glyph.style(style),
                    action.key,
                    action.detail.style(self.ctx.styles.dim),
                );
            }
            println!();
        }

        match &report.failure {
            Some(failure) => {
                self.ctx
                    .error(&format!("{} failed: {}", failure.action_key, failure.message));
                if failure.requires_manual_reconciliation {
                    self.ctx.warn(
                        "the effect was applied but its marker was not recorded; check the server before re-running",
                    );
                }
                self.ctx.info(&format!(
                    "{} action(s) completed before the failure; fix the cause and re-run",
                    report.actions.len()
                ));
            }
            None => {
                let changed = report.changed_count();
                if changed == 0 {
                    self.ctx.success("server already converged");
                } else {
                    self.ctx.success(&format!("{changed} action(s) changed"));
                }
            }
        }
    }

    pub fn render_preview(&self, preview: &Preview) {
        if self.ctx.quiet {
            return;
        }
        let width = preview.actions.iter().map(|a| a.key.len()).max().unwrap_or(0);
        self.ctx.header("Actions:");
        for action in &preview.actions {
            let (label, style) = match action.verdict {
                Verdict::Apply => ("apply", self.ctx.styles.warning),
                Verdict::Satisfied => ("ok", self.ctx.styles.success),
                Verdict::Conditional => ("maybe", self.ctx.styles.info),
            };
            println!(
                "  {}. {:<width$}  {:<5}  {}",
                action.stage,
                action.key,
                label.style(style),
                action.detail.style(self.ctx.styles.dim),
            );
        }
        if !preview.plugin_steps.is_empty() {
            println!();
            self.ctx.header("Plugins:");
            for step in &preview.plugin_steps {
                println!("  - {step}");
            }
        }
    }

    pub fn render_state(&self, dir: &Path, flags: &[CompletionFlag], pins: &[PinRecord]) {
        self.ctx.kv("State dir:", &dir.display().to_string());
        println!();
        self.ctx.header("Flags:");
        if flags.is_empty() {
            self.ctx.info("none");
        }
        for flag in flags {
            self.ctx.kv(
                &flag.action_key,
                &flag.completed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            );
        }
        println!();
        self.ctx.header("Pins:");
        if pins.is_empty() {
            self.ctx.info("none");
        }
        for pin in pins {
            let version = if pin.version.is_empty() { "(unknown)" } else { &pin.version };
            self.ctx.kv(&pin.plugin_name, version);
        }
    }

    pub fn render_validated(&self, path: &Path, desired: &DesiredState) {
        self.ctx.success(&format!("{} is valid", path.display()));
        self.ctx.kv("Plugins:", &desired.plugins.len().to_string());
        self.ctx.kv("Settings:", &desired.settings.len().to_string());
        self.ctx.kv("Credentials:", &desired.credentials.len().to_string());
        self.ctx.kv(
            "Automation user:",
            desired.automation_user.as_ref().map_or("-", |u| u.username.as_str()),
        );
        self.ctx.kv(
            "Bootstrap job:",
            desired.bootstrap_job.as_ref().map_or("-", |j| j.name.as_str()),
        );
    }

    /// Bare path on stdout so it can be used in shell substitutions.
    #[allow(clippy::unused_self)]
    pub fn render_config_path(&self, path: &Path) {
        println!("{}", path.display());
    }

    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn render_config(&self, path: &Path, config: &ConvergeConfig) -> Result<()> {
        self.ctx.kv("Config file:", &path.display().to_string());
        println!();
        let yaml = serde_yaml::to_string(config).context("cannot serialize config")?;
        for line in yaml.lines() {
            println!("  {line}");
        }
        Ok(())
    }
}
