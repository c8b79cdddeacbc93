//! Loads the desired-state document from disk.

use std::path::Path;

use anyhow::{Context, Result};
use converge_common::DesiredState;

/// Read, parse and validate a desired-state YAML (or JSON) file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or violates
/// a document invariant.
pub fn load_desired(path: &Path) -> Result<DesiredState> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let desired: DesiredState = serde_yaml::from_str(&content)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    desired
        .validate()
        .with_context(|| format!("invalid desired state in {}", path.display()))?;
    Ok(desired)
}
