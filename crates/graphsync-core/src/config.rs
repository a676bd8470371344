//! Configuration for graphsync services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GRAPHSYNC__` prefix, `__` separator)
//! 2. Config file (`graphsync.toml`, optional)
//! 3. Defaults

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::labels::SecurityLabel;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphSyncConfig {
    /// Stores hosted by this process.
    #[serde(default)]
    pub stores: Vec<StoreConfig>,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub cqrs: CqrsConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub backup: BackupConfig,
}

impl GraphSyncConfig {
    /// Load from `<file_prefix>.{toml,json,...}` overlaid by environment.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = ::config::Config::builder()
            .add_source(::config::File::with_name(file_prefix).required(false))
            .add_source(
                ::config::Environment::with_prefix("GRAPHSYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        let loaded: Self = cfg
            .try_deserialize()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check that store names are unique and label texts parse.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for store in &self.stores {
            if store.name.is_empty() {
                return Err(CoreError::Config("store with empty name".into()));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate store name: {}",
                    store.name
                )));
            }
            store.default_label()?;
            store.api_label()?;
        }
        Ok(())
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }
}

// ── Stores ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub name: String,

    /// Whether the store carries a label index.
    #[serde(default)]
    pub labelled: bool,

    /// Label applied at read time to statements with no label entry.
    #[serde(default)]
    pub default_label: Option<String>,

    /// Label a caller's attributes must satisfy to use the store at all.
    #[serde(default)]
    pub api_label: Option<String>,
}

impl StoreConfig {
    pub fn plain(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labelled: false,
            default_label: None,
            api_label: None,
        }
    }

    pub fn labelled(name: &str) -> Self {
        Self {
            labelled: true,
            ..Self::plain(name)
        }
    }

    pub fn default_label(&self) -> Result<Option<SecurityLabel>> {
        self.default_label
            .as_deref()
            .map(SecurityLabel::parse)
            .transpose()
    }

    pub fn api_label(&self) -> Result<Option<SecurityLabel>> {
        self.api_label.as_deref().map(SecurityLabel::parse).transpose()
    }
}

// ── Ingest ────────────────────────────────────────────────────────

/// What to do with patch statements that target the labels graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelsGraphPolicy {
    /// Collect them and apply as label assignments at commit.
    #[default]
    Buffer,
    /// Refuse them with an authorization error.
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Maximum messages per batch transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub labels_graph_policy: LabelsGraphPolicy,

    /// Where committed consumer offsets are kept.
    #[serde(default = "default_offsets_file")]
    pub offsets_file: PathBuf,
}

fn default_topic() -> String {
    "RDF".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_offsets_file() -> PathBuf {
    PathBuf::from("./offsets.json")
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            labels_graph_policy: LabelsGraphPolicy::default(),
            offsets_file: default_offsets_file(),
        }
    }
}

// ── CQRS ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CqrsConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    /// When false, patches go to stdout instead of the bus.
    #[serde(default = "default_true")]
    pub connected: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CqrsConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            connected: true,
        }
    }
}

// ── Bus ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Directory holding the file-backed topic logs.
    #[serde(default = "default_bus_dir")]
    pub dir: PathBuf,
}

fn default_bus_dir() -> PathBuf {
    PathBuf::from("./bus")
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dir: default_bus_dir(),
        }
    }
}

// ── Backups ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupConfig {
    /// Backup directory; `./backups` when unset or unusable.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Periodic backup interval while consuming. Disabled when unset.
    #[serde(default)]
    pub interval_secs: Option<u64>,

    /// Take a backup of every store when the consumer shuts down.
    #[serde(default)]
    pub on_shutdown: bool,

    /// Backups kept per store; older ones are deleted after each new
    /// backup. Keeps everything when unset.
    #[serde(default)]
    pub keep: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = GraphSyncConfig::default();
        assert_eq!(config.ingest.topic, "RDF");
        assert_eq!(config.ingest.batch_size, 100);
        assert_eq!(config.ingest.labels_graph_policy, LabelsGraphPolicy::Buffer);
        assert!(config.cqrs.connected);
        assert!(config.backup.dir.is_none());
        assert!(config.backup.keep.is_none());
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphsync.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[[stores]]
name = "knowledge"
labelled = true
default_label = "employee"

[[stores]]
name = "plain"

[ingest]
batch_size = 10
labels_graph_policy = "reject"
"#
        )
        .unwrap();

        let prefix = dir.path().join("graphsync");
        let config = GraphSyncConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.stores.len(), 2);
        assert!(config.store("knowledge").unwrap().labelled);
        assert!(!config.store("plain").unwrap().labelled);
        assert_eq!(config.ingest.batch_size, 10);
        assert_eq!(config.ingest.labels_graph_policy, LabelsGraphPolicy::Reject);
        assert_eq!(config.ingest.topic, "RDF");
    }

    #[test]
    fn duplicate_store_names_rejected() {
        let config = GraphSyncConfig {
            stores: vec![StoreConfig::plain("a"), StoreConfig::labelled("a")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_default_label_rejected() {
        let mut store = StoreConfig::labelled("a");
        store.default_label = Some("(broken".into());
        let config = GraphSyncConfig {
            stores: vec![store],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidLabel { .. })));
    }
}
