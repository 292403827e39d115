//! Storage engine contract
//!
//! Every engine implements `Shipper`. Engines must be safe to call from many
//! tasks at once; each operation is atomic per key.

use async_trait::async_trait;

use cfgship_common::Result;

use crate::model::{Item, Options, Settings, WriteOutcome};

/// A pluggable storage engine
#[async_trait]
pub trait Shipper: Send + Sync {
    /// Name under which the engine is registered
    fn name(&self) -> &'static str;

    /// Provision a configuration, returning engine-specific details
    async fn create_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value>;

    /// Remove a configuration and all of its keys
    async fn delete_config(&self, opts: &Options) -> Result<serde_json::Value>;

    /// Apply new engine-specific settings to a configuration
    async fn update_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value>;

    /// Provisioning state of a configuration
    async fn config_state(&self, opts: &Options) -> Result<String>;

    /// Write `opts.value` under `opts.key`, returning the previous and the new state of the key
    ///
    /// Fails with `ConditionFailed` when `opts.conditional_value` is set and the
    /// current value differs from it.
    async fn update(&self, opts: &Options) -> Result<WriteOutcome>;

    /// Read a key. Expired keys read as absent and are removed.
    async fn get(&self, opts: &Options) -> Result<Option<Item>>;

    /// Delete a key, returning its previous state
    async fn delete(&self, opts: &Options) -> Result<Item>;

    /// Increment the configuration's aggregate version and stamp the modification time
    async fn update_config_version(&self, opts: &Options) -> Result<()>;
}
