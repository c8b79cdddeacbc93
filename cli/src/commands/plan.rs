//! `converge plan`: read-only preview of the next run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::config_service;
use crate::commands::Runtime;
use crate::infra::desired::load_desired;
use crate::output::SilentReporter;

#[derive(Args)]
pub struct PlanArgs {
    /// Desired-state document (YAML)
    #[arg(long, short = 'd', value_name = "FILE")]
    pub desired: PathBuf,
}

/// Run the plan command.
///
/// # Errors
///
/// Returns an error if inputs cannot be loaded or a guard cannot be
/// evaluated.
pub async fn run(app: &AppContext, args: &PlanArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let desired = load_desired(&args.desired)?;
    let runtime = Runtime::from_config(&config)?;

    let preview = runtime.reconciler(&SilentReporter).preview(&desired).await?;
    app.renderer().render_preview(&preview)?;
    Ok(ExitCode::SUCCESS)
}
