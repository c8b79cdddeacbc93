//! Infrastructure implementation of the `StateStore` port.
//!
//! One file per marker inside the state directory, so the managed host can
//! inspect them with plain filesystem tools:
//!
//! - `<dir>/<key>`: completion flag (JSON `CompletionFlag`)
//! - `<dir>/<plugin>_pinned`: pin record (JSON `PinRecord`)
//! - `<dir>/digests/<key>`: SHA-256 of the last applied script
//!
//! Empty marker files left by older provisioning runs are accepted: a bare
//! flag file counts as set, a bare pin file as a pin of unknown version.
//! Writes go through `spawn_blocking` with temp file + rename.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use converge_common::{CompletionFlag, PinRecord, validate_identifier};

use crate::application::ports::StateStore;
use crate::domain::keys::{pin_key, plugin_from_pin_key};

const DIGEST_DIR: &str = "digests";

/// File-backed state store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn marker_path(&self, key: &str) -> Result<PathBuf> {
        anyhow::ensure!(validate_identifier(key), "invalid marker key '{key}'");
        Ok(self.dir.join(key))
    }

    fn digest_path(&self, key: &str) -> Result<PathBuf> {
        anyhow::ensure!(validate_identifier(key), "invalid digest key '{key}'");
        Ok(self.dir.join(DIGEST_DIR).join(key))
    }

    async fn blocking<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T> + Send + 'static,
    {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || f(dir))
            .await
            .with_context(|| format!("state {what} task panicked"))?
    }
}

impl StateStore for FileStateStore {
    async fn get_flag(&self, key: &str) -> Result<bool> {
        let path = self.marker_path(key)?;
        self.blocking("read", move |_| {
            path.try_exists()
                .with_context(|| format!("checking marker {}", path.display()))
        })
        .await
    }

    async fn set_flag(&self, key: &str) -> Result<()> {
        let path = self.marker_path(key)?;
        let flag = CompletionFlag {
            action_key: key.to_string(),
            completed_at: Utc::now(),
        };
        self.blocking("write", move |_| {
            if path.try_exists().unwrap_or(false) {
                return Ok(());
            }
            let content = serde_json::to_vec_pretty(&flag).context("serializing flag")?;
            write_atomic(&path, &content)
        })
        .await
    }

    async fn list_flags(&self) -> Result<Vec<CompletionFlag>> {
        self.blocking("list", |dir| {
            let mut flags = Vec::new();
            for (key, path) in marker_files(&dir)? {
                if plugin_from_pin_key(&key).is_some() {
                    continue;
                }
                flags.push(read_flag(&key, &path)?);
            }
            flags.sort_by(|a, b| a.action_key.cmp(&b.action_key));
            Ok(flags)
        })
        .await
    }

    async fn get_pin(&self, name: &str) -> Result<Option<PinRecord>> {
        let path = self.marker_path(&pin_key(name))?;
        let name = name.to_string();
        self.blocking("read", move |_| read_pin(&name, &path)).await
    }

    async fn set_pin(&self, name: &str, version: &str) -> Result<()> {
        let path = self.marker_path(&pin_key(name))?;
        let record = PinRecord::new(name, version);
        self.blocking("write", move |_| {
            let content = serde_json::to_vec_pretty(&record).context("serializing pin")?;
            write_atomic(&path, &content)
        })
        .await
    }

    async fn delete_pin(&self, name: &str) -> Result<()> {
        let path = self.marker_path(&pin_key(name))?;
        self.blocking("delete", move |_| match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing pin {}", path.display())),
        })
        .await
    }

    async fn list_pins(&self) -> Result<Vec<PinRecord>> {
        self.blocking("list", |dir| {
            let mut pins = Vec::new();
            for (key, path) in marker_files(&dir)? {
                let Some(name) = plugin_from_pin_key(&key) else {
                    continue;
                };
                if let Some(pin) = read_pin(name, &path)? {
                    pins.push(pin);
                }
            }
            pins.sort_by(|a, b| a.plugin_name.cmp(&b.plugin_name));
            Ok(pins)
        })
        .await
    }

    async fn get_digest(&self, key: &str) -> Result<Option<String>> {
        let path = self.digest_path(key)?;
        self.blocking("read", move |_| match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading digest {}", path.display())),
        })
        .await
    }

    async fn set_digest(&self, key: &str, digest: &str) -> Result<()> {
        let path = self.digest_path(key)?;
        let content = format!("{digest}\n");
        self.blocking("write", move |_| write_atomic(&path, content.as_bytes()))
            .await
    }
}

/// Regular files in `dir` whose names are valid marker keys. A missing
/// directory has no markers.
fn marker_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", dir.display()))?;
        if !entry.file_type().is_ok_and(|t| t.is_file()) {
            continue;
        }
        let Some(key) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if validate_identifier(&key) {
            files.push((key, entry.path()));
        }
    }
    Ok(files)
}

fn read_flag(key: &str, path: &Path) -> Result<CompletionFlag> {
    let content =
        std::fs::read(path).with_context(|| format!("reading flag {}", path.display()))?;
    if content.iter().all(u8::is_ascii_whitespace) {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {}", path.display()))?;
        return Ok(CompletionFlag {
            action_key: key.to_string(),
            completed_at: DateTime::<Utc>::from(modified),
        });
    }
    serde_json::from_slice(&content).with_context(|| format!("parsing flag {}", path.display()))
}

fn read_pin(name: &str, path: &Path) -> Result<Option<PinRecord>> {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading pin {}", path.display())),
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Some(PinRecord::new(name, "")));
    }
    let record = serde_json::from_slice(&content)
        .with_context(|| format!("parsing pin {}", path.display()))?;
    Ok(Some(record))
}

/// Write via a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("{} has no parent directory", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;
    std::io::Write::write_all(&mut temp, content)
        .with_context(|| format!("writing temp file for {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp.path().display()))?;
    }

    temp.persist(path)
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}
