//! Managed-server adapter backed by `jenkins-cli.jar`.
//!
//! Implements `PluginInstaller`, `ScriptRunner` and `ServerHealth` by
//! running the CLI jar through a `CommandRunner`. Installed versions are read
//! from the unpacked plugin manifests under `<home>/plugins`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{Context, Result};

use crate::application::ports::{
    CommandRunner, InstallOutcome, PluginInstaller, ScriptOutput, ScriptRunner, ServerHealth,
};
use crate::domain::{ConvergeConfig, InstalledPlugin};

pub struct JenkinsCli<C> {
    runner: C,
    java: String,
    jar: PathBuf,
    url: String,
    identity_file: Option<PathBuf>,
    home: PathBuf,
}

impl<C: CommandRunner> JenkinsCli<C> {
    #[must_use]
    pub fn new(runner: C, config: &ConvergeConfig) -> Self {
        Self {
            runner,
            java: config.server.java.clone(),
            jar: config.cli_jar(),
            url: config.server.url.clone(),
            identity_file: config.server.identity_file.clone(),
            home: config.server.home.clone(),
        }
    }

    /// `-jar <jar> -s <url> [-i <key>]` followed by `command`.
    fn args(&self, command: &[&str]) -> Vec<String> {
        let mut args = vec![
            "-jar".to_string(),
            self.jar.display().to_string(),
            "-s".to_string(),
            self.url.clone(),
        ];
        if let Some(key) = &self.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.extend(command.iter().map(|s| (*s).to_string()));
        args
    }

    async fn cli(&self, command: &[&str]) -> Result<Output> {
        let args = self.args(command);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run(&self.java, &refs).await
    }

    fn plugin_dir(&self) -> PathBuf {
        self.home.join("plugins")
    }
}

impl<C: CommandRunner> PluginInstaller for JenkinsCli<C> {
    async fn install(&self, name: &str, version: Option<&str>) -> Result<InstallOutcome> {
        let before = self.installed(name).await?;
        let spec = match version {
            Some(v) => format!("{name}:{v}"),
            None => name.to_string(),
        };
        let output = self
            .cli(&["install-plugin", &spec])
            .await
            .with_context(|| format!("installing plugin {spec}"))?;
        if !output.status.success() {
            anyhow::bail!("install-plugin {spec} failed: {}", combined(&output).trim());
        }

        let changed = match (&before, version) {
            (None, _) => true,
            (Some(installed), Some(v)) => installed.version.as_deref() != Some(v),
            (Some(_), None) => false,
        };
        Ok(InstallOutcome { changed })
    }

    async fn installed(&self, name: &str) -> Result<Option<InstalledPlugin>> {
        let dir = self.plugin_dir();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || read_installed(&dir, &name))
            .await
            .context("plugin lookup task panicked")?
    }
}

impl<C: CommandRunner> ScriptRunner for JenkinsCli<C> {
    async fn execute(&self, script: &str) -> Result<ScriptOutput> {
        let args = self.args(&["groovy", "="]);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_stdin(&self.java, &refs, script.as_bytes())
            .await
            .context("running groovy script")?;
        Ok(ScriptOutput {
            success: output.status.success(),
            output: combined(&output),
        })
    }
}

impl<C: CommandRunner> ServerHealth for JenkinsCli<C> {
    async fn is_ready(&self) -> Result<bool> {
        let output = self.cli(&["who-am-i"]).await?;
        Ok(output.status.success())
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Live install state of `name` under `plugin_dir`.
///
/// A plugin unpacked by the server has `<name>/META-INF/MANIFEST.MF`; one
/// downloaded but not yet unpacked only has the `.jpi` (or legacy `.hpi`)
/// archive, whose version is unknown until the next restart.
fn read_installed(plugin_dir: &Path, name: &str) -> Result<Option<InstalledPlugin>> {
    let manifest = plugin_dir.join(name).join("META-INF").join("MANIFEST.MF");
    match std::fs::read_to_string(&manifest) {
        Ok(content) => {
            return Ok(Some(InstalledPlugin {
                version: parse_plugin_version(&content),
            }));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("reading {}", manifest.display())),
    }

    for ext in ["jpi", "hpi"] {
        let archive = plugin_dir.join(format!("{name}.{ext}"));
        if archive
            .try_exists()
            .with_context(|| format!("checking {}", archive.display()))?
        {
            return Ok(Some(InstalledPlugin { version: None }));
        }
    }
    Ok(None)
}

/// `Plugin-Version` from a jar manifest.
fn parse_plugin_version(manifest: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        line.strip_prefix("Plugin-Version:")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}
