//! `converge state`: list recorded completion flags and plugin pins.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::StateStore;
use crate::application::services::config_service;
use crate::infra::state::FileStateStore;

#[derive(Args)]
pub struct StateArgs {
    /// State directory (default: from configuration)
    #[arg(long, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,
}

/// Run the state command.
///
/// # Errors
///
/// Returns an error if the configuration or the state directory cannot be
/// read.
pub async fn run(app: &AppContext, args: &StateArgs) -> Result<ExitCode> {
    let dir = match &args.state_dir {
        Some(dir) => dir.clone(),
        None => config_service::load_config(&app.config_store)?.state_dir(),
    };
    let store = FileStateStore::new(dir);
    let flags = store.list_flags().await?;
    let pins = store.list_pins().await?;
    app.renderer().render_state(store.dir(), &flags, &pins)?;
    Ok(ExitCode::SUCCESS)
}
