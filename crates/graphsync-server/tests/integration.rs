//! Daemon lifecycle: update, consume, back up, restart.

use std::fs;
use std::path::Path;

use graphsync_core::config::{BackupConfig, BusConfig, GraphSyncConfig, IngestConfig, StoreConfig};
use graphsync_core::{RdfSyntax, UserAttributes};
use graphsync_cqrs::UpdateContext;
use graphsync_server::Daemon;

fn config(dir: &Path) -> GraphSyncConfig {
    GraphSyncConfig {
        stores: vec![StoreConfig::labelled("kb")],
        ingest: IngestConfig {
            offsets_file: dir.join("offsets.json"),
            ..Default::default()
        },
        bus: BusConfig {
            dir: dir.join("bus"),
        },
        backup: BackupConfig {
            dir: Some(dir.join("backups")),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn publish(daemon: &Daemon, body: &str, label: &str) {
    let store = daemon.registry().get("kb").unwrap();
    let ctx = UpdateContext::new().with_security_label(label);
    daemon
        .pipeline()
        .load(store, &ctx, RdfSyntax::Turtle, body.as_bytes())
        .await
        .unwrap();
}

fn visible(daemon: &Daemon, attrs: &str) -> usize {
    let attrs = UserAttributes::parse(attrs).unwrap();
    daemon
        .registry()
        .get("kb")
        .unwrap()
        .read()
        .visible_triples(&attrs)
        .len()
}

#[tokio::test]
async fn restart_recovers_from_backup_then_catches_up() {
    let dir = tempfile::tempdir().unwrap();

    let first = Daemon::open(config(dir.path())).unwrap();
    first.recover().unwrap();
    publish(&first, "<http://example/a> <http://example/p> \"1\" .", "clearance=secret").await;
    first.drain().unwrap();
    assert_eq!(visible(&first, "clearance=secret"), 1);
    assert_eq!(first.backup(None).unwrap(), vec!["kb"]);

    // Published after the backup; must be replayed on restart.
    publish(&first, "<http://example/b> <http://example/p> \"2\" .", "clearance=secret").await;
    drop(first);

    let second = Daemon::open(config(dir.path())).unwrap();
    second.recover().unwrap();
    assert_eq!(visible(&second, "clearance=secret"), 1);
    let reports = second.drain().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].start_offset, 1);
    assert_eq!(visible(&second, "clearance=secret"), 2);
    assert_eq!(visible(&second, "clearance=public"), 0);
}

#[tokio::test]
async fn restart_without_backup_replays_topic() {
    let dir = tempfile::tempdir().unwrap();
    let first = Daemon::open(config(dir.path())).unwrap();
    publish(&first, "<http://example/a> <http://example/p> \"1\" .", "employee").await;
    first.drain().unwrap();
    drop(first);

    let second = Daemon::open(config(dir.path())).unwrap();
    second.recover().unwrap();
    second.drain().unwrap();
    assert_eq!(visible(&second, "employee"), 1);
}

/// Move a backup and its sidecars to an older timestamp.
fn backdate(dir: &Path, name: &str, stamp: &str) -> String {
    let renamed = format!("kb_{stamp}.nq.gz");
    for suffix in ["", ".blake3", ".offsets.json"] {
        let from = dir.join(format!("{name}{suffix}"));
        if from.exists() {
            fs::rename(from, dir.join(format!("{renamed}{suffix}"))).unwrap();
        }
    }
    renamed
}

#[tokio::test]
async fn restore_by_name_becomes_the_recovery_point() {
    let dir = tempfile::tempdir().unwrap();
    let backups = dir.path().join("backups");

    let first = Daemon::open(config(dir.path())).unwrap();
    first.recover().unwrap();
    publish(&first, "<http://example/a> <http://example/p> \"1\" .", "employee").await;
    first.drain().unwrap();
    first.backup(Some("kb")).unwrap();
    let latest = graphsync_backup::latest(&backups, "kb").unwrap().unwrap();
    let older = backdate(&backups, &latest.name, "2020-01-01_00-00-00");

    publish(&first, "<http://example/b> <http://example/p> \"2\" .", "employee").await;
    first.drain().unwrap();
    first.backup(Some("kb")).unwrap();
    assert_eq!(visible(&first, "employee"), 2);

    let details = graphsync_backup::details(&backups, &older).unwrap();
    assert_eq!(details.verified, Some(true));
    assert_eq!(details.offsets.get("RDF@kb"), Some(&1));

    let report = first.restore_backup(&older).unwrap();
    assert_eq!(report.quads, 1);
    assert_eq!(visible(&first, "employee"), 1);
    first.backup(Some("kb")).unwrap();
    drop(first);

    let second = Daemon::open(config(dir.path())).unwrap();
    second.recover().unwrap();
    assert_eq!(visible(&second, "employee"), 1);
    let reports = second.drain().unwrap();
    assert_eq!(reports[0].start_offset, 1);
    assert_eq!(visible(&second, "employee"), 2);

    graphsync_backup::delete(&backups, &older).unwrap();
    assert!(graphsync_backup::find(&backups, &older).is_err());
}
