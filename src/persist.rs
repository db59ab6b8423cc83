//! # Persist — Key Output
//!
//! The coordinator hands the winning key to a [`KeySink`] exactly once, after
//! the termination flag is set and before the run reports success. Workers use
//! the same sink for watchlist hits, which never stop the search.
//!
//! ## File Layout
//!
//! | Kind | Files |
//! |------|-------|
//! | Match, text | `meshcore_<ID>_public.txt`, `meshcore_<ID>_private.txt` |
//! | Match, JSON | `meshcore_<ID>.json` (`public_key`, `private_key`) |
//! | Watchlist | `watchlist_<FIRST>_<LAST>_<ID>_public.txt`, `..._private.txt` |
//!
//! `<ID>` is the first 8 public-key hex chars, upper-cased. Private key files
//! are created owner-read/write only on Unix.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::keygen::CandidateKey;
use crate::pattern::WatchlistPattern;

pub trait KeySink: Send + Sync {
    /// Persists the primary match; returns the paths written.
    fn store_match(&self, key: &CandidateKey) -> Result<Vec<PathBuf>>;

    /// Persists a watchlist hit; returns the paths written.
    fn store_watchlist(&self, key: &CandidateKey, pattern: &WatchlistPattern)
        -> Result<Vec<PathBuf>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyFormat {
    #[default]
    Text,
    /// Single file the MeshCore app can import.
    Json,
}

#[derive(Serialize)]
struct MeshcoreKeyFile<'a> {
    public_key: &'a str,
    private_key: String,
}

pub struct FileKeySink {
    dir: PathBuf,
    format: KeyFormat,
}

impl FileKeySink {
    pub fn new(dir: impl Into<PathBuf>, format: KeyFormat) -> Self {
        FileKeySink {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating output directory {}", self.dir.display()))
    }

    fn write_pair(&self, stem: &str, key: &CandidateKey) -> Result<Vec<PathBuf>> {
        self.ensure_dir()?;
        let public = self.dir.join(format!("{}_public.txt", stem));
        let private = self.dir.join(format!("{}_private.txt", stem));
        write_file(&public, key.public_hex.as_bytes(), false)?;
        write_file(&private, key.private_hex().as_bytes(), true)?;
        Ok(vec![public, private])
    }
}

fn write_file(path: &Path, contents: &[u8], secret: bool) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    if secret {
        restrict_permissions(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("restricting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl KeySink for FileKeySink {
    fn store_match(&self, key: &CandidateKey) -> Result<Vec<PathBuf>> {
        let stem = format!("meshcore_{}", key.key_id());
        match self.format {
            KeyFormat::Text => self.write_pair(&stem, key),
            KeyFormat::Json => {
                self.ensure_dir()?;
                let path = self.dir.join(format!("{}.json", stem));
                let body = serde_json::to_string_pretty(&MeshcoreKeyFile {
                    public_key: &key.public_hex,
                    private_key: key.private_hex(),
                })?;
                write_file(&path, body.as_bytes(), true)?;
                Ok(vec![path])
            }
        }
    }

    fn store_watchlist(
        &self,
        key: &CandidateKey,
        pattern: &WatchlistPattern,
    ) -> Result<Vec<PathBuf>> {
        let stem = format!("watchlist_{}_{}", pattern.file_stem(), key.key_id());
        self.write_pair(&stem, key)
    }
}
