// Embedded storage engine using RocksDB
// Each configuration lives in its own column family; a meta column family
// records provisioning state and engine settings per configuration.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rocksdb::{
    BlockBasedOptions, BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode,
    DEFAULT_COLUMN_FAMILY_NAME, IteratorMode, MultiThreaded, Options as DbOptions,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cfgship_common::{CFG_STATE_ACTIVE, CfgError, ROOT_KEY, Result};

use crate::clock::{Clock, SystemClock};
use crate::metrics;
use crate::model::{Item, Options, Settings, WriteOutcome};
use crate::traits::Shipper;
use crate::versioning::{
    StoredRecord, apply_config_bump, apply_delete, apply_write, expire_record, read_record,
};

pub type RocksDb = DBWithThreadMode<MultiThreaded>;

/// Name the engine registers under
pub const ENGINE_NAME: &str = "rocksdb";

pub const CF_META: &str = "cfgship_meta";
const CF_PREFIX: &str = "cfg.";

const KEY_LOCK_STRIPES: usize = 64;
const MIN_WRITE_BUFFER_SIZE: u64 = 64 * 1024;

/// Tuning for the RocksDB instance
#[derive(Clone, Debug)]
pub struct RocksDbOptions {
    pub block_cache_mb: usize,
}

impl Default for RocksDbOptions {
    fn default() -> Self {
        Self { block_cache_mb: 64 }
    }
}

/// Per-configuration record in the meta column family
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigMeta {
    state: String,
    #[serde(default)]
    settings: Settings,
    created_time: i64,
}

fn items_cf_name(cfg_name: &str) -> String {
    format!("{CF_PREFIX}{cfg_name}")
}

/// Validate engine settings and convert them into column family options
///
/// Recognized settings:
/// - `write_buffer_size`: bytes, at least 64 KiB
/// - `max_write_buffer_number`: at least 1
/// - `disable_auto_compactions`: boolean
fn column_family_tunables(settings: &Settings) -> Result<Vec<(&'static str, String)>> {
    let mut tunables = Vec::with_capacity(settings.len());

    for (name, value) in settings {
        match name.as_str() {
            "write_buffer_size" => {
                let size = value
                    .as_u64()
                    .filter(|n| *n >= MIN_WRITE_BUFFER_SIZE)
                    .ok_or_else(|| {
                        CfgError::InvalidSettings(format!(
                            "write_buffer_size must be an integer of at least {MIN_WRITE_BUFFER_SIZE}"
                        ))
                    })?;
                tunables.push(("write_buffer_size", size.to_string()));
            }
            "max_write_buffer_number" => {
                let count = value.as_u64().filter(|n| *n >= 1).ok_or_else(|| {
                    CfgError::InvalidSettings(
                        "max_write_buffer_number must be a positive integer".to_string(),
                    )
                })?;
                tunables.push(("max_write_buffer_number", count.to_string()));
            }
            "disable_auto_compactions" => {
                let disabled = value.as_bool().ok_or_else(|| {
                    CfgError::InvalidSettings(
                        "disable_auto_compactions must be a boolean".to_string(),
                    )
                })?;
                tunables.push(("disable_auto_compactions", disabled.to_string()));
            }
            other => {
                return Err(CfgError::InvalidSettings(format!(
                    "unknown setting '{other}'"
                )));
            }
        }
    }

    Ok(tunables)
}

/// Standalone storage engine backed by an embedded RocksDB instance
///
/// Read-modify-write sequences on a key run under a striped lock keyed by
/// (configuration, key), which makes version increments and conditional
/// checks atomic for concurrent callers in this process.
pub struct RocksDbShipper {
    db: Arc<RocksDb>,
    cf_opts: DbOptions,
    key_locks: Vec<Mutex<()>>,
    admin_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl RocksDbShipper {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P, options: &RocksDbOptions) -> Result<Self> {
        let path = path.as_ref();

        let mut db_opts = DbOptions::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut block_opts = BlockBasedOptions::default();
        let cache = rocksdb::Cache::new_lru_cache(options.block_cache_mb * 1024 * 1024);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(10.0, false);

        let mut cf_opts = DbOptions::default();
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        cf_opts.set_block_based_table_factory(&block_opts);

        // Configurations created by earlier runs must be reopened by name
        let mut names = RocksDb::list_cf(&db_opts, path).unwrap_or_default();
        for required in [DEFAULT_COLUMN_FAMILY_NAME, CF_META] {
            if !names.iter().any(|n| n == required) {
                names.push(required.to_string());
            }
        }

        let cfs = names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, cf_opts.clone()));

        let db = RocksDb::open_cf_descriptors(&db_opts, path, cfs).map_err(CfgError::backend)?;

        let shipper = Self {
            db: Arc::new(db),
            cf_opts,
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            admin_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
        };

        let restored = shipper.restore_settings()?;
        info!(
            path = %path.display(),
            configurations = restored,
            "RocksDB storage engine opened"
        );
        Ok(shipper)
    }

    /// Replace the time source used for TTL and modification timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Re-apply persisted settings, which RocksDB does not keep across restarts
    fn restore_settings(&self) -> Result<usize> {
        let meta_cf = self.meta_cf()?;
        let mut restored = 0;

        for entry in self.db.iterator_cf(&meta_cf, IteratorMode::Start) {
            let (key, raw) = entry.map_err(CfgError::backend)?;
            let cfg_name = String::from_utf8_lossy(&key).into_owned();
            let meta: ConfigMeta = match serde_json::from_slice(&raw) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(cfg = %cfg_name, error = %e, "Skipping unreadable configuration metadata");
                    continue;
                }
            };

            let Ok(cf) = self.items_cf(&cfg_name) else {
                continue;
            };
            let applied = column_family_tunables(&meta.settings)
                .and_then(|tunables| self.set_cf_tunables(&cf, &tunables));
            match applied {
                Ok(()) => restored += 1,
                Err(e) => {
                    warn!(cfg = %cfg_name, error = %e, "Skipping invalid configuration settings");
                }
            }
        }

        Ok(restored)
    }

    fn meta_cf(&self) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(CF_META)
            .ok_or_else(|| CfgError::backend(format!("column family '{CF_META}' not found")))
    }

    fn items_cf(&self, cfg_name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(&items_cf_name(cfg_name))
            .ok_or_else(|| CfgError::ConfigNotExist(cfg_name.to_string()))
    }

    fn key_lock(&self, cfg_name: &str, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        cfg_name.hash(&mut hasher);
        key.hash(&mut hasher);
        &self.key_locks[(hasher.finish() as usize) % self.key_locks.len()]
    }

    fn set_cf_tunables(
        &self,
        cf: &Arc<BoundColumnFamily<'_>>,
        tunables: &[(&'static str, String)],
    ) -> Result<()> {
        if tunables.is_empty() {
            return Ok(());
        }
        let pairs: Vec<(&str, &str)> = tunables.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.db.set_options_cf(cf, &pairs).map_err(CfgError::backend)
    }

    fn load_meta(&self, cfg_name: &str) -> Result<Option<ConfigMeta>> {
        let meta_cf = self.meta_cf()?;
        match self
            .db
            .get_cf(&meta_cf, cfg_name.as_bytes())
            .map_err(CfgError::backend)?
        {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(CfgError::backend),
            None => Ok(None),
        }
    }

    fn store_meta(&self, cfg_name: &str, meta: &ConfigMeta) -> Result<()> {
        let meta_cf = self.meta_cf()?;
        let raw = serde_json::to_vec(meta).map_err(CfgError::backend)?;
        self.db
            .put_cf(&meta_cf, cfg_name.as_bytes(), raw)
            .map_err(CfgError::backend)
    }

    fn load_record(&self, cf: &Arc<BoundColumnFamily<'_>>, key: &str) -> Result<Option<StoredRecord>> {
        match self.db.get_cf(cf, key.as_bytes()).map_err(CfgError::backend)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(CfgError::backend),
            None => Ok(None),
        }
    }

    fn store_record(
        &self,
        cf: &Arc<BoundColumnFamily<'_>>,
        key: &str,
        record: Option<&StoredRecord>,
    ) -> Result<()> {
        match record {
            Some(record) => {
                let raw = serde_json::to_vec(record).map_err(CfgError::backend)?;
                self.db
                    .put_cf(cf, key.as_bytes(), raw)
                    .map_err(CfgError::backend)
            }
            None => self
                .db
                .delete_cf(cf, key.as_bytes())
                .map_err(CfgError::backend),
        }
    }

    /// Remove an expired record, unless it was rewritten since it was read
    fn remove_expired(
        &self,
        cf: &Arc<BoundColumnFamily<'_>>,
        opts: &Options,
        now: i64,
    ) -> Result<()> {
        let _guard = self.key_lock(&opts.cfg_name, &opts.key).lock();

        let Some(record) = self.load_record(cf, &opts.key)? else {
            return Ok(());
        };

        if let Some(remaining) = expire_record(&record, now) {
            self.store_record(cf, &opts.key, remaining.as_ref())?;
            metrics::record_item_expired(ENGINE_NAME);
            debug!(cfg = %opts.cfg_name, key = %opts.key, "Removed expired item");
        }

        Ok(())
    }
}

#[async_trait]
impl Shipper for RocksDbShipper {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    async fn create_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value> {
        let tunables = column_family_tunables(settings)?;
        let cf_name = items_cf_name(&opts.cfg_name);

        let _admin = self.admin_lock.lock();
        if self.db.cf_handle(&cf_name).is_some() {
            return Err(CfgError::ConfigAlreadyExist(opts.cfg_name.clone()));
        }

        self.db
            .create_cf(&cf_name, &self.cf_opts)
            .map_err(CfgError::backend)?;

        let cf = self.items_cf(&opts.cfg_name)?;
        self.set_cf_tunables(&cf, &tunables)?;

        let meta = ConfigMeta {
            state: CFG_STATE_ACTIVE.to_string(),
            settings: settings.clone(),
            created_time: self.clock.now_nanos(),
        };
        self.store_meta(&opts.cfg_name, &meta)?;

        info!(cfg = %opts.cfg_name, column_family = %cf_name, "Configuration created");

        Ok(serde_json::json!({
            "name": opts.cfg_name,
            "columnFamily": cf_name,
            "state": meta.state,
            "settings": meta.settings,
        }))
    }

    async fn delete_config(&self, opts: &Options) -> Result<serde_json::Value> {
        let cf_name = items_cf_name(&opts.cfg_name);

        let _admin = self.admin_lock.lock();
        if self.db.cf_handle(&cf_name).is_none() {
            return Err(CfgError::ConfigNotExist(opts.cfg_name.clone()));
        }

        self.db.drop_cf(&cf_name).map_err(CfgError::backend)?;

        let meta_cf = self.meta_cf()?;
        self.db
            .delete_cf(&meta_cf, opts.cfg_name.as_bytes())
            .map_err(CfgError::backend)?;

        info!(cfg = %opts.cfg_name, column_family = %cf_name, "Configuration deleted");

        Ok(serde_json::json!({
            "columnFamily": cf_name,
            "deleted": true,
        }))
    }

    async fn update_config(&self, opts: &Options, settings: &Settings) -> Result<serde_json::Value> {
        let tunables = column_family_tunables(settings)?;

        let _admin = self.admin_lock.lock();
        let cf = self.items_cf(&opts.cfg_name)?;
        self.set_cf_tunables(&cf, &tunables)?;

        let mut meta = self.load_meta(&opts.cfg_name)?.unwrap_or_else(|| ConfigMeta {
            state: CFG_STATE_ACTIVE.to_string(),
            settings: Settings::new(),
            created_time: self.clock.now_nanos(),
        });
        for (name, value) in settings {
            meta.settings.insert(name.clone(), value.clone());
        }
        self.store_meta(&opts.cfg_name, &meta)?;

        info!(cfg = %opts.cfg_name, settings = settings.len(), "Configuration updated");

        Ok(serde_json::json!({
            "state": meta.state,
            "settings": meta.settings,
        }))
    }

    async fn config_state(&self, opts: &Options) -> Result<String> {
        self.items_cf(&opts.cfg_name)?;
        Ok(self
            .load_meta(&opts.cfg_name)?
            .map(|meta| meta.state)
            .unwrap_or_else(|| CFG_STATE_ACTIVE.to_string()))
    }

    async fn update(&self, opts: &Options) -> Result<WriteOutcome> {
        let cf = self.items_cf(&opts.cfg_name)?;
        let _guard = self.key_lock(&opts.cfg_name, &opts.key).lock();

        let existing = self.load_record(&cf, &opts.key)?;
        let (record, previous) = apply_write(
            &opts.key,
            existing.as_ref(),
            opts,
            self.clock.now_nanos(),
        )
        .inspect_err(|e| metrics::record_if_condition_failed(ENGINE_NAME, e))?;

        self.store_record(&cf, &opts.key, Some(&record))?;
        debug!(cfg = %opts.cfg_name, key = %opts.key, version = record.version, "Item written");

        Ok(WriteOutcome {
            previous,
            current: record.to_item(&opts.key),
        })
    }

    async fn get(&self, opts: &Options) -> Result<Option<Item>> {
        let cf = self.items_cf(&opts.cfg_name)?;
        let now = self.clock.now_nanos();

        let record = self.load_record(&cf, &opts.key)?;
        let outcome = read_record(&opts.key, record.as_ref(), now);
        // Cleanup is best-effort; the read is already a miss
        if outcome.expired
            && let Err(e) = self.remove_expired(&cf, opts, now)
        {
            warn!(cfg = %opts.cfg_name, key = %opts.key, error = %e, "Failed to remove expired item");
        }

        Ok(outcome.item)
    }

    async fn delete(&self, opts: &Options) -> Result<Item> {
        let cf = self.items_cf(&opts.cfg_name)?;
        let _guard = self.key_lock(&opts.cfg_name, &opts.key).lock();

        let existing = self.load_record(&cf, &opts.key)?;
        let (remaining, previous) = apply_delete(
            &opts.key,
            existing.as_ref(),
            opts.conditional_value.as_deref(),
        )
        .inspect_err(|e| metrics::record_if_condition_failed(ENGINE_NAME, e))?;

        if existing.is_some() {
            self.store_record(&cf, &opts.key, remaining.as_ref())?;
        }
        debug!(cfg = %opts.cfg_name, key = %opts.key, "Item deleted");

        Ok(previous)
    }

    async fn update_config_version(&self, opts: &Options) -> Result<()> {
        let cf = self.items_cf(&opts.cfg_name)?;
        let _guard = self.key_lock(&opts.cfg_name, ROOT_KEY).lock();

        let existing = self.load_record(&cf, ROOT_KEY)?;
        let record = apply_config_bump(existing.as_ref(), self.clock.now_nanos());
        self.store_record(&cf, ROOT_KEY, Some(&record))?;

        metrics::record_version_bump(ENGINE_NAME);
        debug!(cfg = %opts.cfg_name, cfg_version = record.cfg_version, "Configuration version bumped");

        Ok(())
    }
}
