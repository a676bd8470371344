//! Name → store lookup for the stores hosted by one process.

use std::collections::BTreeMap;

use graphsync_core::config::StoreConfig;

use crate::store::{Result, Store, StoreError};

#[derive(Debug, Clone, Default)]
pub struct StoreRegistry {
    stores: BTreeMap<String, Store>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[StoreConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Store::from_config(config)?)?;
        }
        tracing::info!(stores = registry.len(), "Store registry built");
        Ok(registry)
    }

    pub fn register(&mut self, store: Store) -> Result<()> {
        if self.stores.contains_key(store.name()) {
            return Err(StoreError::DuplicateStore(store.name().to_string()));
        }
        self.stores.insert(store.name().to_string(), store);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Store> {
        self.stores
            .get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn stores(&self) -> impl Iterator<Item = &Store> {
        self.stores.values()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
