//! Writing backups.
//!
//! At most one backup per store runs at a time: a request that finds its
//! store already in the [`InFlight`] set returns
//! [`SnapshotOutcome::AlreadyRunning`] without touching the disk.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use graphsync_bus::OffsetStore;
use graphsync_ingest::labels_graph::label_quads;
use graphsync_store::{ReadView, Store, StoreId, StoreRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::catalog::{self, checksum_path, file_checksum, file_name, offsets_path};
use crate::Result;

// ── In-flight registry ────────────────────────────────────────────

/// Stores with a backup currently being written.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<Mutex<HashSet<StoreId>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`. `None` when a backup of it is already running.
    pub fn try_claim(&self, id: StoreId) -> Option<InFlightGuard> {
        if !self.running.lock().insert(id) {
            return None;
        }
        Some(InFlightGuard {
            running: Arc::clone(&self.running),
            id,
        })
    }

    pub fn is_running(&self, id: StoreId) -> bool {
        self.running.lock().contains(&id)
    }
}

/// Releases its claim on drop, including on error paths.
#[derive(Debug)]
pub struct InFlightGuard {
    running: Arc<Mutex<HashSet<StoreId>>>,
    id: StoreId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.id);
    }
}

// ── Snapshots ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub store: String,
    pub path: PathBuf,
    /// Store version captured.
    pub seq: u64,
    pub quads: usize,
    pub label_entries: usize,
    pub bytes: u64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// Consumer offsets for this store, captured before the data.
    pub offsets: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Written(BackupFile),
    AlreadyRunning,
}

#[derive(Debug, Clone)]
pub struct Snapshotter {
    dir: PathBuf,
    in_flight: InFlight,
    offsets: Option<Arc<OffsetStore>>,
    keep: Option<usize>,
}

impl Snapshotter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            in_flight: InFlight::new(),
            offsets: None,
            keep: None,
        }
    }

    /// Keep only the newest `keep` backups of a store after writing one.
    pub fn with_retention(mut self, keep: Option<usize>) -> Self {
        self.keep = keep;
        self
    }

    /// Record consumer offsets alongside each backup.
    pub fn with_offsets(mut self, offsets: Arc<OffsetStore>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Back up the store's current version.
    pub fn snapshot(&self, store: &Store) -> Result<SnapshotOutcome> {
        let Some(_guard) = self.in_flight.try_claim(store.id()) else {
            tracing::warn!(store = %store.name(), "Backup already in progress");
            return Ok(SnapshotOutcome::AlreadyRunning);
        };
        // Offsets first: replaying from an older offset only re-applies
        // messages already in the snapshot.
        let offsets = self.store_offsets(store.name());
        let view = store.read();
        let file = self.write_view(&view, offsets, Utc::now())?;
        if let Some(keep) = self.keep {
            let removed = catalog::prune(&self.dir, store.name(), keep.max(1))?;
            if !removed.is_empty() {
                tracing::info!(store = %store.name(), removed = ?removed, "Old backups pruned");
            }
        }
        Ok(SnapshotOutcome::Written(file))
    }

    fn store_offsets(&self, store: &str) -> BTreeMap<String, u64> {
        let Some(offsets) = &self.offsets else {
            return BTreeMap::new();
        };
        let suffix = format!("@{store}");
        offsets
            .snapshot()
            .into_iter()
            .filter(|(key, _)| key.ends_with(&suffix))
            .collect()
    }

    fn write_view(
        &self,
        view: &ReadView,
        offsets: BTreeMap<String, u64>,
        at: DateTime<Utc>,
    ) -> Result<BackupFile> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name(view.store_name(), at));

        // Removed on drop unless persisted.
        let tmp = NamedTempFile::new_in(&self.dir)?;
        let entries = view.label_entries();
        let mut gz = GzEncoder::new(BufWriter::new(tmp), Compression::default());
        for quad in view.quads() {
            writeln!(gz, "{}", quad.to_nquads_line())?;
        }
        let labels = label_quads(entries.iter().map(|(t, l)| (t, l.as_slice())));
        for quad in &labels {
            writeln!(gz, "{}", quad.to_nquads_line())?;
        }
        let tmp = gz.finish()?.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        let checksum = file_checksum(&path)?;
        fs::write(checksum_path(&path), format!("{checksum}\n"))?;
        if !offsets.is_empty() {
            fs::write(offsets_path(&path), serde_json::to_vec_pretty(&offsets)?)?;
        }
        let bytes = fs::metadata(&path)?.len();

        tracing::info!(
            store = %view.store_name(),
            path = %path.display(),
            seq = view.seq(),
            quads = view.len(),
            label_entries = entries.len(),
            bytes,
            "Backup written"
        );

        Ok(BackupFile {
            store: view.store_name().to_string(),
            path,
            seq: view.seq(),
            quads: view.len(),
            label_entries: entries.len(),
            bytes,
            checksum,
            created_at: at,
            offsets,
        })
    }

    /// Back up every registered store, or just `only`. Returns the names of
    /// the stores backed up; stores with a backup already running are
    /// skipped.
    pub fn backup_all(&self, registry: &StoreRegistry, only: Option<&str>) -> Result<Vec<String>> {
        let stores: Vec<&Store> = match only {
            Some(name) => vec![registry.get(name)?],
            None => registry.stores().collect(),
        };
        let mut done = Vec::new();
        for store in stores {
            if let SnapshotOutcome::Written(file) = self.snapshot(store)? {
                done.push(file.store);
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use flate2::read::GzDecoder;
    use graphsync_core::{SecurityLabel, Term, Triple};

    fn triple(o: &str) -> Triple {
        Triple::new(
            Term::iri("http://e/s"),
            Term::iri("http://e/p"),
            Term::literal(o),
        )
    }

    fn labelled_store() -> Store {
        let store = Store::labelled("/ds/kb", None);
        let mut txn = store.begin_write();
        txn.add(&triple("a").in_default_graph());
        txn.add(&triple("b").in_default_graph());
        txn.add_labels(&triple("a"), &[SecurityLabel::parse("secret").unwrap()])
            .unwrap();
        txn.commit();
        store
    }

    fn read_gz(path: &Path) -> String {
        let mut text = String::new();
        GzDecoder::new(fs::File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn writes_data_then_labels() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = Snapshotter::new(dir.path());
        let SnapshotOutcome::Written(file) = snapshotter.snapshot(&labelled_store()).unwrap()
        else {
            panic!("backup skipped");
        };
        assert_eq!((file.quads, file.label_entries), (2, 1));
        assert!(file
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("ds_kb_") && n.ends_with(".nq.gz")));
        assert!(catalog::verify(&file.path).unwrap());

        let text = read_gz(&file.path);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("<http://e/s>"));
        assert!(lines[3].contains("http://graphsync.dev/security#labels"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = Snapshotter::new(dir.path());
        let store = labelled_store();
        let at = Utc::now();
        // A directory where the backup should land makes the final rename fail.
        let target = dir.path().join(file_name(store.name(), at));
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"").unwrap();

        assert!(snapshotter
            .write_view(&store.read(), BTreeMap::new(), at)
            .is_err());
        let names: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .collect();
        assert_eq!(names, vec![target]);
    }

    #[test]
    fn concurrent_request_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = Snapshotter::new(dir.path());
        let store = labelled_store();

        let held = snapshotter.in_flight().try_claim(store.id()).unwrap();
        assert_eq!(snapshotter.snapshot(&store).unwrap(), SnapshotOutcome::AlreadyRunning);
        drop(held);

        assert!(!snapshotter.in_flight().is_running(store.id()));
        assert!(matches!(
            snapshotter.snapshot(&store).unwrap(),
            SnapshotOutcome::Written(_)
        ));
        assert!(!snapshotter.in_flight().is_running(store.id()));
    }

    #[test]
    fn simultaneous_snapshots_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = Snapshotter::new(dir.path());
        let store = Store::labelled("kb", None);
        let mut txn = store.begin_write();
        for i in 0..20_000 {
            txn.add(&triple(&format!("v{i}")).in_default_graph());
        }
        txn.commit();

        let barrier = Barrier::new(2);
        let outcomes: Vec<SnapshotOutcome> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        snapshotter.snapshot(&store).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let written = outcomes
            .iter()
            .filter(|o| matches!(o, SnapshotOutcome::Written(_)))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| **o == SnapshotOutcome::AlreadyRunning)
            .count();
        assert_eq!((written, skipped), (1, 1));
        assert_eq!(catalog::list(dir.path()).unwrap().len(), 1);
        assert!(!snapshotter.in_flight().is_running(store.id()));
    }

    #[test]
    fn retention_prunes_older_backups() {
        let dir = tempfile::tempdir().unwrap();
        let store = labelled_store();
        let old = dir.path().join("ds_kb_2020-01-01_00-00-00.nq.gz");
        fs::write(&old, b"old").unwrap();
        fs::write(catalog::checksum_path(&old), b"x").unwrap();

        let snapshotter = Snapshotter::new(dir.path()).with_retention(Some(1));
        let SnapshotOutcome::Written(file) = snapshotter.snapshot(&store).unwrap() else {
            panic!("backup skipped");
        };
        let left = catalog::list(dir.path()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].path, file.path);
        assert!(!catalog::checksum_path(&old).exists());
    }

    #[test]
    fn backup_all_lists_names() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = Snapshotter::new(dir.path());
        let mut registry = StoreRegistry::new();
        registry.register(labelled_store()).unwrap();
        registry.register(Store::plain("other")).unwrap();

        let names = snapshotter.backup_all(&registry, None).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(snapshotter.backup_all(&registry, Some("other")).unwrap(), vec!["other"]);
        assert!(snapshotter.backup_all(&registry, Some("missing")).is_err());
        assert_eq!(
            serde_json::to_string(&names).unwrap(),
            r#"["/ds/kb","other"]"#
        );
    }
}
