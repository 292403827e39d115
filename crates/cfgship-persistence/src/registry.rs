//! Storage engine registry
//!
//! Engines are registered under a name and resolved per request from
//! `Options::storage_interface_name`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use cfgship_common::{CfgError, Result};

use crate::embedded::{self, RocksDbOptions, RocksDbShipper};
use crate::memory::{self, MemoryShipper};
use crate::model::Options;
use crate::traits::Shipper;

/// Name to engine mapping
#[derive(Clone, Default)]
pub struct ShipperRegistry {
    shippers: HashMap<String, Arc<dyn Shipper>>,
}

impl std::fmt::Debug for ShipperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipperRegistry")
            .field("shippers", &self.names())
            .finish()
    }
}

impl ShipperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in engines: RocksDB at `data_dir` and the in-memory engine
    pub fn with_builtin<P: AsRef<Path>>(data_dir: P, options: &RocksDbOptions) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(
            embedded::ENGINE_NAME,
            Arc::new(RocksDbShipper::open(data_dir, options)?),
        );
        registry.register(memory::ENGINE_NAME, Arc::new(MemoryShipper::new()));
        Ok(registry)
    }

    /// Register an engine, replacing and returning any engine of the same name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        shipper: Arc<dyn Shipper>,
    ) -> Option<Arc<dyn Shipper>> {
        let name = name.into();
        info!(engine = %name, "Storage engine registered");
        self.shippers.insert(name, shipper)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Shipper>> {
        self.shippers
            .get(name)
            .cloned()
            .ok_or_else(|| CfgError::InvalidStorageEngine(name.to_string()))
    }

    /// Engine requested by the options, defaulting to the built-in engine
    pub fn resolve(&self, opts: &Options) -> Result<Arc<dyn Shipper>> {
        self.get(opts.storage_name())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.shippers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_resolve_unknown_engine() {
        let registry = ShipperRegistry::new();
        let err = registry
            .resolve(&Options::new("app").with_storage("dynamodb"))
            .err()
            .unwrap();
        assert!(matches!(err, CfgError::InvalidStorageEngine(name) if name == "dynamodb"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ShipperRegistry::new();
        assert!(
            registry
                .register("memory", Arc::new(MemoryShipper::new()))
                .is_none()
        );
        assert!(
            registry
                .register("memory", Arc::new(MemoryShipper::new()))
                .is_some()
        );
        assert_eq!(registry.names(), vec!["memory"]);
    }

    #[test]
    fn test_builtin_engines() {
        let dir = TempDir::new().unwrap();
        let registry = ShipperRegistry::with_builtin(dir.path(), &RocksDbOptions::default()).unwrap();
        assert_eq!(registry.names(), vec!["memory", "rocksdb"]);

        // Empty engine name falls back to the default engine
        let shipper = registry.resolve(&Options::new("app")).unwrap();
        assert_eq!(shipper.name(), "rocksdb");

        let shipper = registry
            .resolve(&Options::new("app").with_storage("memory"))
            .unwrap();
        assert_eq!(shipper.name(), "memory");
    }
}
