// In-memory storage engine
// Non-durable; used for tests, benchmarks and throwaway sessions

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::{debug, info};

use cfgship_common::{CFG_STATE_ACTIVE, CfgError, ROOT_KEY, Result};

use crate::clock::{Clock, SystemClock};
use crate::metrics;
use crate::model::{Item, Options, Settings, WriteOutcome};
use crate::traits::Shipper;
use crate::versioning::{
    StoredRecord, apply_config_bump, apply_delete, apply_write, expire_record, read_record,
};

/// Name the engine registers under
pub const ENGINE_NAME: &str = "memory";

struct MemoryConfig {
    settings: RwLock<Settings>,
    items: DashMap<String, StoredRecord>,
}

/// Storage engine keeping everything in concurrent maps
///
/// Per-key atomicity comes from holding the map entry while the versioning
/// protocol runs. Any settings are accepted and echoed back.
pub struct MemoryShipper {
    configs: DashMap<String, Arc<MemoryConfig>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryShipper {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryShipper {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn config(&self, cfg_name: &str) -> Result<Arc<MemoryConfig>> {
        self.configs
            .get(cfg_name)
            .map(|c| c.value().clone())
            .ok_or_else(|| CfgError::ConfigNotExist(cfg_name.to_string()))
    }
}

/// Write back the outcome of a protocol step through the held entry
fn put_entry(entry: Entry<'_, String, StoredRecord>, remaining: Option<StoredRecord>) {
    match (entry, remaining) {
        (Entry::Occupied(mut occupied), Some(record)) => {
            occupied.insert(record);
        }
        (Entry::Occupied(occupied), None) => {
            occupied.remove();
        }
        (Entry::Vacant(vacant), Some(record)) => {
            vacant.insert(record);
        }
        (Entry::Vacant(_), None) => {}
    }
}

#[async_trait]
impl Shipper for MemoryShipper {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    async fn create_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value> {
        match self.configs.entry(opts.cfg_name.clone()) {
            Entry::Occupied(_) => Err(CfgError::ConfigAlreadyExist(opts.cfg_name.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(MemoryConfig {
                    settings: RwLock::new(settings.clone()),
                    items: DashMap::new(),
                }));
                info!(cfg = %opts.cfg_name, "Configuration created in memory");
                Ok(serde_json::json!({
                    "state": CFG_STATE_ACTIVE,
                    "settings": settings,
                }))
            }
        }
    }

    async fn delete_config(&self, opts: &Options) -> Result<serde_json::Value> {
        self.configs
            .remove(&opts.cfg_name)
            .ok_or_else(|| CfgError::ConfigNotExist(opts.cfg_name.clone()))?;
        info!(cfg = %opts.cfg_name, "Configuration deleted from memory");
        Ok(serde_json::json!({ "deleted": true }))
    }

    async fn update_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value> {
        let config = self.config(&opts.cfg_name)?;
        let mut current = config.settings.write();
        for (name, value) in settings {
            current.insert(name.clone(), value.clone());
        }
        let snapshot = current.clone();
        Ok(serde_json::json!({
            "state": CFG_STATE_ACTIVE,
            "settings": snapshot,
        }))
    }

    async fn config_state(&self, opts: &Options) -> Result<String> {
        self.config(&opts.cfg_name)?;
        Ok(CFG_STATE_ACTIVE.to_string())
    }

    async fn update(&self, opts: &Options) -> Result<WriteOutcome> {
        let config = self.config(&opts.cfg_name)?;
        let now = self.clock.now_nanos();

        let entry = config.items.entry(opts.key.clone());
        let existing = match &entry {
            Entry::Occupied(occupied) => Some(occupied.get()),
            Entry::Vacant(_) => None,
        };
        let (record, previous) = apply_write(&opts.key, existing, opts, now)
            .inspect_err(|e| metrics::record_if_condition_failed(ENGINE_NAME, e))?;

        debug!(cfg = %opts.cfg_name, key = %opts.key, version = record.version, "Item written");
        let current = record.to_item(&opts.key);
        put_entry(entry, Some(record));
        Ok(WriteOutcome { previous, current })
    }

    async fn get(&self, opts: &Options) -> Result<Option<Item>> {
        let config = self.config(&opts.cfg_name)?;
        let now = self.clock.now_nanos();

        let record = config.items.get(&opts.key).map(|r| r.value().clone());
        let outcome = read_record(&opts.key, record.as_ref(), now);

        if outcome.expired
            && let Entry::Occupied(occupied) = config.items.entry(opts.key.clone())
            && let Some(remaining) = expire_record(occupied.get(), now)
        {
            put_entry(Entry::Occupied(occupied), remaining);
            metrics::record_item_expired(ENGINE_NAME);
            debug!(cfg = %opts.cfg_name, key = %opts.key, "Removed expired item");
        }

        Ok(outcome.item)
    }

    async fn delete(&self, opts: &Options) -> Result<Item> {
        let config = self.config(&opts.cfg_name)?;

        let entry = config.items.entry(opts.key.clone());
        let existing = match &entry {
            Entry::Occupied(occupied) => Some(occupied.get()),
            Entry::Vacant(_) => None,
        };
        let (remaining, previous) =
            apply_delete(&opts.key, existing, opts.conditional_value.as_deref())
                .inspect_err(|e| metrics::record_if_condition_failed(ENGINE_NAME, e))?;

        put_entry(entry, remaining);
        Ok(previous)
    }

    async fn update_config_version(&self, opts: &Options) -> Result<()> {
        let config = self.config(&opts.cfg_name)?;
        let now = self.clock.now_nanos();

        let mut root = config.items.entry(ROOT_KEY.to_string()).or_default();
        let bumped = apply_config_bump(Some(&*root), now);
        *root = bumped;
        metrics::record_version_bump(ENGINE_NAME);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::clock::ManualClock;

    async fn shipper_with(cfg: &str) -> MemoryShipper {
        let shipper = MemoryShipper::new();
        shipper
            .create_config(&Options::new(cfg), &Settings::new())
            .await
            .unwrap();
        shipper
    }

    #[tokio::test]
    async fn test_config_lifecycle() {
        let shipper = shipper_with("app").await;
        assert_eq!(
            shipper.config_state(&Options::new("app")).await.unwrap(),
            "ACTIVE"
        );

        let mut settings = Settings::new();
        settings.insert("anything".to_string(), serde_json::json!(true));
        let details = shipper
            .update_config(&Options::new("app"), &settings)
            .await
            .unwrap();
        assert_eq!(details["settings"]["anything"], true);

        assert!(matches!(
            shipper
                .create_config(&Options::new("app"), &Settings::new())
                .await,
            Err(CfgError::ConfigAlreadyExist(_))
        ));

        shipper.delete_config(&Options::new("app")).await.unwrap();
        assert!(matches!(
            shipper.get(&Options::new("app").with_key("k")).await,
            Err(CfgError::ConfigNotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_versions_increment_per_write() {
        let shipper = shipper_with("app").await;

        for expected in 1..=3 {
            let opts = Options::new("app").with_key("k").with_value(format!("v{expected}"));
            let previous = shipper.update(&opts).await.unwrap().previous;
            assert_eq!(previous.version, expected - 1);
        }

        let item = shipper
            .get(&Options::new("app").with_key("k"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.version, 3);
        assert_eq!(item.value, Some(Bytes::from_static(b"v3")));
    }

    #[tokio::test]
    async fn test_expired_item_is_removed_on_read() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let shipper = shipper_with("app").await.with_clock(clock.clone());

        let opts = Options::new("app").with_key("k").with_value("v").with_ttl(1);
        let written = shipper.update(&opts).await.unwrap();
        assert_eq!(written.current.version, 1);
        assert_eq!(written.current.expiration_nanos, 2_000_000_000);

        clock.advance(Duration::from_millis(999));
        assert!(shipper.get(&opts).await.unwrap().is_some());

        clock.advance(Duration::from_millis(1));
        assert!(shipper.get(&opts).await.unwrap().is_none());

        let config = shipper.config("app").unwrap();
        assert!(config.items.get("k").is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_key_returns_empty_previous() {
        let shipper = shipper_with("app").await;
        let previous = shipper
            .delete(&Options::new("app").with_key("nothing"))
            .await
            .unwrap();
        assert!(previous.is_empty());
        assert_eq!(previous.key, "nothing");
    }

    #[tokio::test]
    async fn test_update_config_version_creates_root() {
        let shipper = shipper_with("app").await;
        let opts = Options::new("app").with_key(ROOT_KEY);

        shipper.update_config_version(&opts).await.unwrap();
        let root = shipper.get(&opts).await.unwrap().unwrap();
        assert_eq!(root.cfg_version, 1);
        assert!(root.cfg_modified_nanos > 0);
        assert!(root.value.is_none());
    }
}
