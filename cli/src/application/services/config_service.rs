//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::ConvergeConfig;

/// Load configuration.
pub fn load_config(store: &impl ConfigStore) -> Result<ConvergeConfig> {
    store.load()
}

/// Validate and persist a single dotted key, returning the updated config.
///
/// # Errors
///
/// Returns an error if the key or value is invalid or the file cannot be
/// written.
pub fn set_config_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<ConvergeConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    store.save(&config)?;
    Ok(config)
}
