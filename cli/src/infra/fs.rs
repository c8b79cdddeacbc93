//! Filesystem infrastructure: implements `HostFs` on the local host.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::HostFs;

/// Production filesystem implementation of `HostFs`.
pub struct LocalFs;

impl HostFs for LocalFs {
    async fn ensure_dir(&self, path: &Path) -> Result<bool> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if path.is_dir() {
                return Ok(false);
            }
            std::fs::create_dir_all(&path)
                .with_context(|| format!("creating directory {}", path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                    .with_context(|| format!("setting permissions on {}", path.display()))?;
            }
            Ok(true)
        })
        .await
        .context("spawn_blocking for ensure_dir")?
    }

    async fn write_if_changed(&self, path: &Path, content: &[u8]) -> Result<bool> {
        let path: PathBuf = path.to_path_buf();
        let content = content.to_vec();
        tokio::task::spawn_blocking(move || {
            match std::fs::read(&path) {
                Ok(existing) if existing == content => return Ok(false),
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
            }

            let parent = path
                .parent()
                .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", path.display()))?;
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
            let mut temp = tempfile::NamedTempFile::new_in(parent)
                .with_context(|| format!("creating temp file in {}", parent.display()))?;
            std::io::Write::write_all(&mut temp, &content)
                .with_context(|| format!("writing {}", path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o640))
                    .with_context(|| format!("setting permissions on {}", path.display()))?;
            }
            temp.persist(&path)
                .with_context(|| format!("finalizing {}", path.display()))?;
            Ok(true)
        })
        .await
        .context("spawn_blocking for write_if_changed")?
    }
}
