//! Infrastructure implementation of the `SecretStore` port.
//!
//! Secret bags are JSON files laid out per environment:
//! `<root>/<environment>/<bag_id>.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use converge_common::{SecretRecord, validate_identifier};

use crate::application::ports::SecretStore;

pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl SecretStore for FileSecretStore {
    async fn get_secret(&self, environment: &str, bag_id: &str) -> Result<SecretRecord> {
        anyhow::ensure!(
            validate_identifier(environment) || environment == "_default",
            "invalid environment '{environment}'"
        );
        anyhow::ensure!(validate_identifier(bag_id), "invalid secret bag id '{bag_id}'");

        let path = self.root.join(environment).join(format!("{bag_id}.json"));
        tokio::task::spawn_blocking(move || {
            let content = std::fs::read(&path)
                .with_context(|| format!("reading secret bag {}", path.display()))?;
            serde_json::from_slice::<SecretRecord>(&content)
                .with_context(|| format!("parsing secret bag {}", path.display()))
        })
        .await
        .context("secret lookup task panicked")?
    }
}
