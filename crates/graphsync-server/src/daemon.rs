//! Long-running consumer process.
//!
//! Stores are in memory, so on start each store is rebuilt: from its
//! newest backup (with the offsets recorded beside it) when there is one,
//! otherwise by replaying its topic from the beginning.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use graphsync_backup::{self as backup, BackupEntry, RestoreReport, Snapshotter};
use graphsync_bus::{FileBus, OffsetStore};
use graphsync_core::config::GraphSyncConfig;
use graphsync_cqrs::CqrsPipeline;
use graphsync_ingest::{BatchReport, IngestConsumer};
use graphsync_store::{Store, StoreRegistry};

use crate::error::{Result, ServerError};

pub struct Daemon {
    config: GraphSyncConfig,
    registry: StoreRegistry,
    bus: Arc<FileBus>,
    offsets: Arc<OffsetStore>,
    snapshotter: Snapshotter,
}

impl Daemon {
    pub fn open(config: GraphSyncConfig) -> Result<Self> {
        let registry = StoreRegistry::from_configs(&config.stores)?;
        let bus = Arc::new(FileBus::open(&config.bus.dir)?);
        let offsets = Arc::new(OffsetStore::open(&config.ingest.offsets_file)?);
        let backup_dir = backup::resolve_dir(config.backup.dir.as_deref());
        let snapshotter = Snapshotter::new(backup_dir)
            .with_offsets(Arc::clone(&offsets))
            .with_retention(config.backup.keep);

        tracing::info!(
            stores = registry.len(),
            bus = %config.bus.dir.display(),
            backups = %snapshotter.dir().display(),
            "Daemon opened"
        );
        Ok(Self {
            config,
            registry,
            bus,
            offsets,
            snapshotter,
        })
    }

    pub fn config(&self) -> &GraphSyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.registry
    }

    pub fn backup_dir(&self) -> &Path {
        self.snapshotter.dir()
    }

    /// Update pipeline for the configured CQRS topic.
    pub fn pipeline(&self) -> CqrsPipeline {
        let topic = self.config.cqrs.topic.clone();
        if self.config.cqrs.connected {
            CqrsPipeline::connected(topic, self.bus.clone())
        } else {
            CqrsPipeline::disconnected(topic)
        }
    }

    pub fn consumers(&self) -> Vec<IngestConsumer> {
        self.registry
            .stores()
            .map(|store| {
                IngestConsumer::new(
                    store.clone(),
                    self.bus.clone(),
                    Arc::clone(&self.offsets),
                    &self.config.ingest,
                )
            })
            .collect()
    }

    /// Rebuild every store from its newest backup, or rewind its consumer
    /// to the start of the topic.
    pub fn recover(&self) -> Result<()> {
        for store in self.registry.stores() {
            match backup::latest(self.backup_dir(), store.name())? {
                Some(entry) => {
                    self.restore_entry(store, &entry)?;
                }
                None => {
                    self.offsets.commit(&self.offset_key(store), 0)?;
                    tracing::info!(store = %store.name(), "No backup; replaying topic");
                }
            }
        }
        Ok(())
    }

    /// Restore the backup called `name` into the store it was taken from,
    /// together with its recorded offsets.
    pub fn restore_backup(&self, name: &str) -> Result<RestoreReport> {
        let entry = backup::find(self.backup_dir(), name)?;
        let store = self
            .registry
            .stores()
            .find(|s| backup::catalog::sanitise(s.name()) == entry.store)
            .ok_or_else(|| ServerError::NoStoreForBackup(name.to_string()))?;
        self.restore_entry(store, &entry)
    }

    fn restore_entry(&self, store: &Store, entry: &BackupEntry) -> Result<RestoreReport> {
        let report = backup::restore(store, &entry.path)?;
        let key = self.offset_key(store);
        if backup::restore_offsets(&entry.path, &self.offsets)? == 0 {
            self.offsets.commit(&key, 0)?;
        }
        tracing::info!(
            store = %store.name(),
            backup = %entry.name,
            quads = report.quads,
            offset = self.offsets.get(&key),
            "Store recovered from backup"
        );
        Ok(report)
    }

    fn offset_key(&self, store: &Store) -> String {
        IngestConsumer::offset_key_for(&self.config.ingest.topic, store.name())
    }

    /// Apply everything waiting on the topic to every store.
    pub fn drain(&self) -> Result<Vec<BatchReport>> {
        let mut reports = Vec::new();
        for consumer in self.consumers() {
            reports.extend(consumer.drain()?);
        }
        Ok(reports)
    }

    /// Back up all stores, or only `only`.
    pub fn backup(&self, only: Option<&str>) -> Result<Vec<String>> {
        Ok(self.snapshotter.backup_all(&self.registry, only)?)
    }

    /// Consume until `shutdown` flips to true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for consumer in self.consumers() {
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let store = consumer.store().name().to_string();
                if let Err(e) = consumer.run(rx).await {
                    tracing::error!(store = %store, error = %e, "Consumer failed");
                }
            }));
        }

        if let Some(secs) = self.config.backup.interval_secs.filter(|s| *s > 0) {
            let snapshotter = self.snapshotter.clone();
            let registry = self.registry.clone();
            let rx = shutdown.clone();
            handles.push(tokio::spawn(run_backup_loop(
                snapshotter,
                registry,
                Duration::from_secs(secs),
                rx,
            )));
        }

        tracing::info!(tasks = handles.len(), "Daemon started");

        let mut shutdown = shutdown;
        loop {
            let stop = *shutdown.borrow();
            if stop || shutdown.changed().await.is_err() {
                break;
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Daemon task panicked");
            }
        }

        if self.config.backup.on_shutdown {
            let snapshotter = self.snapshotter.clone();
            let registry = self.registry.clone();
            let names = tokio::task::spawn_blocking(move || snapshotter.backup_all(&registry, None))
                .await
                .map_err(|e| ServerError::Task(e.to_string()))??;
            tracing::info!(stores = ?names, "Shutdown backup complete");
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }
}

async fn run_backup_loop(
    snapshotter: Snapshotter,
    registry: StoreRegistry,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let snapshotter = snapshotter.clone();
        let registry = registry.clone();
        match tokio::task::spawn_blocking(move || snapshotter.backup_all(&registry, None)).await {
            Ok(Ok(names)) => tracing::info!(stores = ?names, "Scheduled backup complete"),
            Ok(Err(e)) => tracing::error!(error = %e, "Scheduled backup failed"),
            Err(e) => tracing::error!(error = %e, "Scheduled backup panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::config::{BackupConfig, BusConfig, IngestConfig, StoreConfig};

    fn config(dir: &Path) -> GraphSyncConfig {
        GraphSyncConfig {
            stores: vec![StoreConfig::labelled("kb"), StoreConfig::plain("open")],
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

    #[test]
    fn one_consumer_per_store() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::open(config(dir.path())).unwrap();
        let keys: Vec<String> = daemon.consumers().iter().map(|c| c.offset_key()).collect();
        assert_eq!(keys, vec!["RDF@kb", "RDF@open"]);
        assert_eq!(daemon.backup_dir(), dir.path().join("backups"));
    }

    #[test]
    fn restore_backup_by_name_rolls_back_store_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::open(config(dir.path())).unwrap();
        daemon.recover().unwrap();
        let kb = daemon.registry().get("kb").unwrap();

        let quad = graphsync_core::Triple::parse("<http://e/s> <http://e/p> \"v\"")
            .unwrap()
            .in_default_graph();
        let mut txn = kb.begin_write();
        txn.add(&quad);
        txn.commit();
        daemon.offsets.commit("RDF@kb", 7).unwrap();
        daemon.backup(Some("kb")).unwrap();
        let name = backup::latest(daemon.backup_dir(), "kb").unwrap().unwrap().name;

        let mut txn = kb.begin_write();
        txn.clear();
        txn.commit();
        daemon.offsets.commit("RDF@kb", 9).unwrap();

        let report = daemon.restore_backup(&name).unwrap();
        assert_eq!(report.quads, 1);
        assert!(kb.read().contains(&quad));
        assert_eq!(daemon.offsets.get("RDF@kb"), 7);

        assert!(matches!(
            daemon.restore_backup("kb_1999-01-01_00-00-00.nq.gz"),
            Err(ServerError::Backup(backup::BackupError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn run_returns_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.backup.on_shutdown = true;
        let daemon = Daemon::open(cfg).unwrap();
        let backups = daemon.backup_dir().to_path_buf();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(backup::list(&backups).unwrap().len(), 2);
    }
}
