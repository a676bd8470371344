//! Committed consumer offsets.
//!
//! Stored as a JSON object of `topic → next offset`. Writes go to a
//! temporary file that is renamed over the old one, so a crash leaves
//! either the previous or the new offsets, never a torn file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::Result;

#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    offsets: Mutex<BTreeMap<String, u64>>,
}

impl OffsetStore {
    /// Load offsets from `path`. A missing file means no offsets yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let offsets = if path.exists() {
            let json = fs::read_to_string(&path)?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            offsets: Mutex::new(offsets),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next offset to consume for `topic`; 0 when never committed.
    pub fn get(&self, topic: &str) -> u64 {
        self.offsets.lock().get(topic).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.offsets.lock().clone()
    }

    /// Record `next` for `topic` and persist all offsets.
    pub fn commit(&self, topic: &str, next: u64) -> Result<()> {
        let mut offsets = self.offsets.lock();
        offsets.insert(topic.to_string(), next);
        write_atomic(&self.path, &serde_json::to_vec_pretty(&*offsets)?)?;
        tracing::debug!(topic = %topic, next, "Offset committed");
        Ok(())
    }

    /// Replace all offsets, e.g. when restoring alongside a backup.
    pub fn restore(&self, offsets: BTreeMap<String, u64>) -> Result<()> {
        let mut current = self.offsets.lock();
        write_atomic(&self.path, &serde_json::to_vec_pretty(&offsets)?)?;
        *current = offsets;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsets.json");
        let store = OffsetStore::open(&path).unwrap();
        assert_eq!(store.get("RDF"), 0);
        store.commit("RDF", 42).unwrap();

        let reloaded = OffsetStore::open(&path).unwrap();
        assert_eq!(reloaded.get("RDF"), 42);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn restore_replaces_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = OffsetStore::open(dir.path().join("nested/offsets.json")).unwrap();
        store.commit("a", 1).unwrap();
        store
            .restore(BTreeMap::from([("b".to_string(), 9)]))
            .unwrap();
        assert_eq!(store.get("a"), 0);
        assert_eq!(store.get("b"), 9);
    }
}
