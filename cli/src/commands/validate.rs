//! `converge validate`: offline check of a desired-state document.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::infra::desired::load_desired;

#[derive(Args)]
pub struct ValidateArgs {
    /// Desired-state document (YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Run the validate command.
///
/// # Errors
///
/// Returns an error if the document cannot be read, parsed or validated.
pub fn run(app: &AppContext, args: &ValidateArgs) -> Result<ExitCode> {
    let desired = load_desired(&args.file)?;
    app.renderer().render_validated(&args.file, &desired)?;
    Ok(ExitCode::SUCCESS)
}
