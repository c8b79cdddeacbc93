//! `converge apply`: converge the server onto a desired-state document.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::config_service;
use crate::commands::Runtime;
use crate::infra::desired::load_desired;

/// Exit code for a run that stopped at a failing action.
const EXIT_RUN_FAILED: u8 = 2;

#[derive(Args)]
pub struct ApplyArgs {
    /// Desired-state document (YAML)
    #[arg(long, short = 'd', value_name = "FILE")]
    pub desired: PathBuf,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Run the apply command.
///
/// # Errors
///
/// Returns an error if the configuration or the desired state cannot be
/// loaded. A failed run is reported, not returned.
pub async fn run(app: &AppContext, args: &ApplyArgs) -> Result<ExitCode> {
    let config = config_service::load_config(&app.config_store)?;
    let desired = load_desired(&args.desired)?;

    if !app.confirm(&format!("Converge {} onto {}?", config.server.url, args.desired.display()), true)? {
        app.output.info("Aborted");
        return Ok(ExitCode::SUCCESS);
    }

    let runtime = Runtime::from_config(&config)?;
    let reporter = app.reporter();
    let report = runtime.reconciler(&reporter).reconcile(&desired).await;

    app.renderer().render_report(&report)?;
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_RUN_FAILED))
    }
}
