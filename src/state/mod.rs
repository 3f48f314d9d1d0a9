//! State Store: durable key/value JSON files, one per concern, written
//! with a write-temp-then-rename idiom so a crash never leaves a
//! partially-written file behind.

pub mod files;

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Read a typed state file. Missing file or corrupt JSON both yield
    /// `Ok(None)` with a log line: corruption on read is logged, defaults
    /// are used, and the next successful write heals the file.
    pub fn read<T: DeserializeOwned>(&self, filename: &str) -> Option<T> {
        let path = self.path(filename);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("state file {:?} is corrupt, using defaults: {e}", path);
                None
            }
        }
    }

    /// Atomic write: serialize to a `.tmp` sibling, then rename over the
    /// target. A crash after the rename leaves a consistent file; a
    /// crash before it leaves the prior state untouched.
    pub fn write<T: Serialize>(&self, filename: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating state dir {:?}", self.dir))?;
        let path = self.path(filename);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(value).context("serializing state value")?;
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing temp state file {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
        info!("wrote state file {:?}", path);
        Ok(())
    }

    pub fn full_path(&self, filename: &str) -> PathBuf {
        self.path(filename)
    }
}

/// Shared helper for any caller that wants atomic-write semantics outside
/// of a `StateStore` instance (e.g. alert files living alongside state).
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: i64,
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = std::env::temp_dir().join(format!(
            "execmon-state-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        let store = StateStore::new(&dir);
        store.write("sample.json", &Sample { value: 42 }).unwrap();
        let read: Sample = store.read("sample.json").unwrap();
        assert_eq!(read, Sample { value: 42 });
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = std::env::temp_dir().join(format!(
            "execmon-state-test-missing-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        let store = StateStore::new(&dir);
        let read: Option<Sample> = store.read("missing.json");
        assert!(read.is_none());
    }

    #[test]
    fn corrupt_file_reads_as_none() {
        let dir = std::env::temp_dir().join(format!(
            "execmon-state-test-corrupt-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), "{ not json").unwrap();
        let store = StateStore::new(&dir);
        let read: Option<Sample> = store.read("bad.json");
        assert!(read.is_none());
    }
}
