//! Restoring a store from a backup file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use graphsync_bus::OffsetStore;
use graphsync_core::RdfSyntax;
use graphsync_ingest::loader::{self, LoadOptions};
use graphsync_store::Store;
use serde::Serialize;

use crate::catalog;
use crate::{BackupError, Result};

const RESTORE_BASE: &str = "urn:graphsync:backup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub store: String,
    pub quads: usize,
    pub label_entries: usize,
    pub seq: u64,
}

/// Replace the store's data and labels with the backup's content.
///
/// The checksum is verified first; a mismatch leaves the store untouched.
/// A backup without a checksum sidecar is restored with a warning.
pub fn restore(store: &Store, path: &Path) -> Result<RestoreReport> {
    let is_backup = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(catalog::BACKUP_SUFFIX));
    if !is_backup {
        return Err(BackupError::NotABackup(path.to_path_buf()));
    }
    match catalog::verify(path) {
        Ok(true) => {}
        Ok(false) => return Err(BackupError::ChecksumMismatch(path.to_path_buf())),
        Err(BackupError::MissingChecksum(_)) => {
            tracing::warn!(path = %path.display(), "Restoring backup without checksum");
        }
        Err(e) => return Err(e),
    }

    let mut body = Vec::new();
    GzDecoder::new(fs::File::open(path)?).read_to_end(&mut body)?;

    let mut txn = store.begin_write();
    txn.clear();
    loader::load(
        &mut txn,
        RdfSyntax::NQuads,
        &body,
        LoadOptions {
            base: RESTORE_BASE.to_string(),
            labels: None,
            named_graph_warned: false,
        },
    )?;
    let seq = txn.commit();

    let view = store.read();
    let report = RestoreReport {
        store: store.name().to_string(),
        quads: view.len(),
        label_entries: view.label_entries().len(),
        seq,
    };
    tracing::info!(
        store = %report.store,
        path = %path.display(),
        quads = report.quads,
        label_entries = report.label_entries,
        seq,
        "Backup restored"
    );
    Ok(report)
}

/// Put back the consumer offsets recorded with a backup. Returns how many
/// were restored; a backup taken without offsets restores none.
pub fn restore_offsets(path: &Path, offsets: &OffsetStore) -> Result<usize> {
    let recorded: BTreeMap<String, u64> = match fs::read(catalog::offsets_path(path)) {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    for (key, next) in &recorded {
        offsets.commit(key, *next)?;
    }
    tracing::info!(path = %path.display(), restored = recorded.len(), "Offsets restored");
    Ok(recorded.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{SnapshotOutcome, Snapshotter};
    use graphsync_core::{SecurityLabel, Term, Triple, UserAttributes};

    fn triple(o: &str) -> Triple {
        Triple::new(
            Term::iri("http://e/s"),
            Term::iri("http://e/p"),
            Term::literal(o),
        )
    }

    #[test]
    fn restore_replaces_data_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::labelled("kb", None);
        let mut txn = store.begin_write();
        txn.add(&triple("kept").in_default_graph());
        txn.add_labels(&triple("kept"), &[SecurityLabel::parse("employee").unwrap()])
            .unwrap();
        txn.commit();

        let SnapshotOutcome::Written(file) = Snapshotter::new(dir.path()).snapshot(&store).unwrap()
        else {
            panic!("backup skipped");
        };

        let mut txn = store.begin_write();
        txn.add(&triple("later").in_default_graph());
        txn.commit();
        assert_eq!(store.read().len(), 2);

        let report = restore(&store, &file.path).unwrap();
        assert_eq!((report.quads, report.label_entries), (1, 1));
        let view = store.read();
        assert!(!view.contains(&triple("later").in_default_graph()));
        let staff = UserAttributes::parse("employee").unwrap();
        assert_eq!(view.visible_triples(&staff), vec![triple("kept")]);
    }

    #[test]
    fn offsets_travel_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let offsets = Arc::new(OffsetStore::open(dir.path().join("offsets.json")).unwrap());
        offsets.commit("RDF@kb", 42).unwrap();
        offsets.commit("RDF@other", 7).unwrap();

        let store = Store::plain("kb");
        let snapshotter = Snapshotter::new(dir.path().join("backups")).with_offsets(offsets);
        let SnapshotOutcome::Written(file) = snapshotter.snapshot(&store).unwrap() else {
            panic!("backup skipped");
        };
        assert_eq!(file.offsets.len(), 1);

        let fresh = OffsetStore::open(dir.path().join("fresh.json")).unwrap();
        assert_eq!(restore_offsets(&file.path, &fresh).unwrap(), 1);
        assert_eq!(fresh.get("RDF@kb"), 42);
        assert_eq!(fresh.get("RDF@other"), 0);
    }

    #[test]
    fn tampered_backup_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::plain("kb");
        let mut txn = store.begin_write();
        txn.add(&triple("x").in_default_graph());
        txn.commit();
        let SnapshotOutcome::Written(file) = Snapshotter::new(dir.path()).snapshot(&store).unwrap()
        else {
            panic!("backup skipped");
        };
        fs::write(&file.path, b"not gzip").unwrap();

        let err = restore(&store, &file.path).unwrap_err();
        assert!(matches!(err, BackupError::ChecksumMismatch(_)));
        assert_eq!(store.read().len(), 1);
    }
}
