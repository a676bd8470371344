//! Store handles, versions and errors.

use std::fmt;
use std::sync::Arc;

use graphsync_core::config::StoreConfig;
use graphsync_core::{CoreError, Quad, SecurityLabel, UserAttributes};
use im::OrdSet;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::labels::LabelIndex;
use crate::mutations::WriteTxn;
use crate::queries::ReadView;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store '{store}' has no label index")]
    NoLabelStore { store: String },

    #[error("Store '{store}' already has an active writer")]
    WriterBusy { store: String },

    #[error("Access to store '{store}' denied")]
    AccessDenied { store: String },

    #[error("Unknown store: {0}")]
    UnknownStore(String),

    #[error("Duplicate store: {0}")]
    DuplicateStore(String),

    #[error("Invalid store configuration: {0}")]
    Config(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Process-unique store identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(pub Uuid);

impl StoreId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One published state of a store.
#[derive(Debug, Clone)]
pub struct StoreVersion {
    pub seq: u64,
    pub quads: OrdSet<Quad>,
    /// Present exactly when the store is labelled.
    pub labels: Option<LabelIndex>,
}

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub labelled: bool,
    /// Read-time label for unlabelled statements. Labelled stores fall back
    /// to the deny-all label when none is configured.
    pub default_label: Option<SecurityLabel>,
    pub api_label: Option<SecurityLabel>,
}

pub(crate) struct StoreInner {
    pub(crate) id: StoreId,
    pub(crate) name: Arc<str>,
    pub(crate) current: RwLock<Arc<StoreVersion>>,
    pub(crate) writer: Arc<Mutex<()>>,
    pub(crate) default_label: Option<SecurityLabel>,
    pub(crate) api_label: Option<SecurityLabel>,
}

/// A named quad store. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    pub fn new(name: &str, options: StoreOptions) -> Self {
        let default_label = options
            .labelled
            .then(|| options.default_label.unwrap_or_else(SecurityLabel::deny_all));
        let version = StoreVersion {
            seq: 0,
            quads: OrdSet::new(),
            labels: options.labelled.then(LabelIndex::new),
        };
        let store = Self {
            inner: Arc::new(StoreInner {
                id: StoreId::new(),
                name: Arc::from(name),
                current: RwLock::new(Arc::new(version)),
                writer: Arc::new(Mutex::new(())),
                default_label,
                api_label: options.api_label,
            }),
        };
        tracing::debug!(
            store = %name,
            id = %store.id(),
            labelled = options.labelled,
            "Store created"
        );
        store
    }

    pub fn plain(name: &str) -> Self {
        Self::new(name, StoreOptions::default())
    }

    pub fn labelled(name: &str, default_label: Option<SecurityLabel>) -> Self {
        Self::new(
            name,
            StoreOptions {
                labelled: true,
                default_label,
                api_label: None,
            },
        )
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(
            &config.name,
            StoreOptions {
                labelled: config.labelled,
                default_label: config.default_label()?,
                api_label: config.api_label()?,
            },
        ))
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_labelled(&self) -> bool {
        self.inner.default_label.is_some()
    }

    pub fn default_label(&self) -> Option<&SecurityLabel> {
        self.inner.default_label.as_ref()
    }

    /// Sequence number of the latest published version.
    pub fn seq(&self) -> u64 {
        self.inner.current.read().seq
    }

    /// Snapshot of the latest published version.
    pub fn read(&self) -> ReadView {
        ReadView::new(
            self.current(),
            self.inner.default_label.clone(),
            Arc::clone(&self.inner.name),
        )
    }

    /// Begin a write transaction, waiting for any active writer to finish.
    pub fn begin_write(&self) -> WriteTxn {
        let guard = self.inner.writer.lock_arc();
        WriteTxn::new(self.clone(), guard)
    }

    /// Begin a write transaction only if no other writer is active.
    pub fn try_begin_write(&self) -> Result<WriteTxn> {
        let guard = self
            .inner
            .writer
            .try_lock_arc()
            .ok_or_else(|| StoreError::WriterBusy {
                store: self.name().to_string(),
            })?;
        Ok(WriteTxn::new(self.clone(), guard))
    }

    /// Check the caller against the store's API-access label.
    pub fn check_api_access(&self, attrs: &UserAttributes) -> Result<()> {
        match &self.inner.api_label {
            Some(label) if !label.evaluate(attrs) => {
                tracing::warn!(store = %self.name(), label = %label, "API access denied");
                Err(StoreError::AccessDenied {
                    store: self.name().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn current(&self) -> Arc<StoreVersion> {
        Arc::clone(&self.inner.current.read())
    }

    pub(crate) fn view_of(&self, version: StoreVersion) -> ReadView {
        ReadView::new(
            Arc::new(version),
            self.inner.default_label.clone(),
            Arc::clone(&self.inner.name),
        )
    }

    pub(crate) fn install(&self, version: StoreVersion) {
        *self.inner.current.write() = Arc::new(version);
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("labelled", &self.is_labelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_store_defaults_to_deny() {
        let store = Store::labelled("kb", None);
        assert!(store.is_labelled());
        assert_eq!(store.default_label(), Some(&SecurityLabel::deny_all()));
        assert!(!Store::plain("p").is_labelled());
    }

    #[test]
    fn api_label_enforced() {
        let store = Store::new(
            "kb",
            StoreOptions {
                api_label: Some(SecurityLabel::parse("role=analyst").unwrap()),
                ..Default::default()
            },
        );
        let analyst = UserAttributes::parse("role=analyst").unwrap();
        assert!(store.check_api_access(&analyst).is_ok());
        assert!(matches!(
            store.check_api_access(&UserAttributes::new()),
            Err(StoreError::AccessDenied { .. })
        ));
    }

    #[test]
    fn second_writer_is_busy() {
        let store = Store::plain("p");
        let txn = store.begin_write();
        assert!(matches!(store.try_begin_write(), Err(StoreError::WriterBusy { .. })));
        drop(txn);
        assert!(store.try_begin_write().is_ok());
    }

    #[test]
    fn from_config_reads_labels() {
        let mut config = StoreConfig::labelled("kb");
        config.default_label = Some("employee".into());
        let store = Store::from_config(&config).unwrap();
        assert_eq!(store.default_label().unwrap().as_str(), "employee");

        config.default_label = Some("(".into());
        assert!(matches!(Store::from_config(&config), Err(StoreError::Config(_))));
    }
}
