//! # Checkpoint — Cumulative Run Statistics
//!
//! A vanity search has no position to resume from: every trial is independent.
//! What is worth keeping across restarts is how much work has already been
//! spent on a target, so the ETA keeps counting from where the last run
//! stopped instead of starting over at "50% chance after ln2/p".
//!
//! ## Atomic Writes
//!
//! Checkpoint files are written to a temp file then renamed, so a crash
//! mid-write never leaves a truncated checkpoint behind.
//!
//! ## Integrity
//!
//! Each file stores the SHA-256 of its payload's compact JSON. A file whose
//! digest does not match is skipped and the next older generation is tried
//! (3 generations are kept).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of backup generations to keep.
const GENERATIONS: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// [`crate::config::MatchMode::label`] of the target these stats belong to.
    pub mode: String,
    pub attempts: u64,
    pub elapsed_secs: f64,
    #[serde(default)]
    pub watchlist_hits: u64,
    #[serde(default)]
    pub runs: u32,
}

impl RunCheckpoint {
    pub fn new(mode: impl Into<String>) -> Self {
        RunCheckpoint {
            mode: mode.into(),
            attempts: 0,
            elapsed_secs: 0.0,
            watchlist_hits: 0,
            runs: 0,
        }
    }
}

/// On-disk wrapper: the stats plus a digest of their compact JSON form.
#[derive(Serialize, Deserialize)]
struct Sealed {
    checksum: String,
    data: serde_json::Value,
}

impl Sealed {
    fn seal(stats: &RunCheckpoint) -> Result<Self> {
        let data = serde_json::to_value(stats)?;
        Ok(Sealed {
            checksum: sha256_hex(&serde_json::to_string(&data)?),
            data,
        })
    }

    /// `None` when the digest does not match the payload.
    fn open(self, origin: &Path) -> Option<RunCheckpoint> {
        let digest = sha256_hex(&serde_json::to_string(&self.data).ok()?);
        if digest != self.checksum {
            warn!(path = %origin.display(), "checkpoint digest mismatch, skipping");
            return None;
        }
        serde_json::from_value(self.data).ok()
    }
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// `base`, `base.1`, `base.2`, ... newest first.
fn generation_path(base: &Path, gen: usize) -> PathBuf {
    match gen {
        0 => base.to_path_buf(),
        n => {
            let mut name = base.as_os_str().to_os_string();
            name.push(format!(".{}", n));
            PathBuf::from(name)
        }
    }
}

/// Shifts existing generations down one slot, then writes `stats` via a temp file.
pub fn save(path: &Path, stats: &RunCheckpoint) -> Result<()> {
    for gen in (1..GENERATIONS).rev() {
        let older = generation_path(path, gen - 1);
        if older.exists() {
            let _ = fs::rename(&older, generation_path(path, gen));
        }
    }

    let body = serde_json::to_string_pretty(&Sealed::seal(stats)?)?;
    let staging = path.with_extension("tmp");
    fs::write(&staging, body)
        .with_context(|| format!("writing checkpoint {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("replacing checkpoint {}", path.display()))?;
    Ok(())
}

/// Newest generation that parses and passes its digest check.
pub fn load(path: &Path) -> Option<RunCheckpoint> {
    (0..GENERATIONS).find_map(|gen| {
        let candidate = generation_path(path, gen);
        let stats = load_single(&candidate)?;
        if gen > 0 {
            warn!(generation = gen, path = %candidate.display(), "fell back to an older checkpoint");
        }
        Some(stats)
    })
}

/// Like [`load`], but drops stats recorded for a different target.
pub fn load_for(path: &Path, mode: &str) -> Option<RunCheckpoint> {
    let stats = load(path)?;
    if stats.mode != mode {
        warn!(
            checkpoint_mode = %stats.mode,
            current_mode = %mode,
            "ignoring checkpoint for a different target"
        );
        return None;
    }
    Some(stats)
}

fn load_single(path: &Path) -> Option<RunCheckpoint> {
    let text = fs::read_to_string(path).ok()?;
    let sealed: Sealed = serde_json::from_str(&text).ok()?;
    sealed.open(path)
}

/// Deletes every generation plus any half-written temp file.
pub fn clear(path: &Path) {
    let staging = std::iter::once(path.with_extension("tmp"));
    for file in (0..GENERATIONS).map(|gen| generation_path(path, gen)).chain(staging) {
        let _ = fs::remove_file(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(mode: &str, attempts: u64) -> RunCheckpoint {
        RunCheckpoint {
            mode: mode.into(),
            attempts,
            elapsed_secs: attempts as f64 / 1000.0,
            watchlist_hits: 1,
            runs: 2,
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let cp = stats("vanity-8", 42_000);
        save(&path, &cp).unwrap();
        assert_eq!(load(&path), Some(cp));
    }

    #[test]
    fn rotation_keeps_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        for n in 1..=3u64 {
            save(&path, &stats("vanity-8", n * 10)).unwrap();
        }
        assert_eq!(load_single(&path).unwrap().attempts, 30);
        assert_eq!(load_single(&generation_path(&path, 1)).unwrap().attempts, 20);
        assert_eq!(load_single(&generation_path(&path, 2)).unwrap().attempts, 10);
    }

    #[test]
    fn fallback_on_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        save(&path, &stats("vanity-8", 100)).unwrap();
        save(&path, &stats("vanity-8", 200)).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        fs::write(&path, raw.replace("200", "999")).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.attempts, 100);
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("absent.json")), None);
    }

    #[test]
    fn load_for_filters_by_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        save(&path, &stats("prefix:f8", 5)).unwrap();
        assert!(load_for(&path, "prefix:f8").is_some());
        assert!(load_for(&path, "vanity-4").is_none());
    }

    #[test]
    fn clear_removes_every_generation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        for n in 0..4 {
            save(&path, &stats("vanity-8", n)).unwrap();
        }
        clear(&path);
        for gen in 0..GENERATIONS {
            assert!(!generation_path(&path, gen).exists());
        }
        assert_eq!(load(&path), None);
    }

    #[test]
    fn older_files_without_optional_fields_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let data = serde_json::json!({"mode": "vanity-2", "attempts": 7, "elapsed_secs": 0.5});
        let checksum = sha256_hex(&serde_json::to_string(&data).unwrap());
        let envelope = serde_json::json!({"checksum": checksum, "data": data});
        fs::write(&path, envelope.to_string()).unwrap();
        let cp = load(&path).unwrap();
        assert_eq!(cp.attempts, 7);
        assert_eq!(cp.runs, 0);
    }
}
