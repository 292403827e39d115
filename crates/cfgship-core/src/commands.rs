//! Command orchestrator
//!
//! Each command validates its input before touching storage, in this order:
//! value, configuration name, key, storage engine. Successful key writes and
//! deletes are followed by a configuration version bump. The two steps are
//! not atomic: a failure in between leaves the key written and the
//! configuration version stale, and is reported as a backend failure.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use cfgship_common::error::KEY_NOT_FOUND;
use cfgship_common::{
    ACTION_CREATE, ACTION_DELETE, ACTION_DELETE_CFG, ACTION_EXPORT, ACTION_GET, ACTION_INFO,
    ACTION_SET, ACTION_UPDATE_CFG, ACTION_USE, ACTION_WHICH, CfgError, ROOT_KEY, Result,
    normalize_key,
};
use cfgship_persistence::{Item, Options, Settings, Shipper, ShipperRegistry};

use crate::model::ResponseObject;
use crate::working::WorkingConfigFile;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Entry point for every configuration and key operation
#[derive(Clone, Debug)]
pub struct Commands {
    registry: Arc<ShipperRegistry>,
    working: WorkingConfigFile,
}

impl Commands {
    pub fn new(registry: Arc<ShipperRegistry>, working: WorkingConfigFile) -> Self {
        Self { registry, working }
    }

    pub fn registry(&self) -> &ShipperRegistry {
        &self.registry
    }

    /// Configuration named in the options, else the working configuration
    async fn resolve_cfg_name(&self, opts: &Options) -> Result<String> {
        if !opts.cfg_name.is_empty() {
            return Ok(opts.cfg_name.clone());
        }
        self.working.read().await?.ok_or(CfgError::MissingConfigName)
    }

    /// Options with the configuration resolved, plus the engine to run them on
    async fn prepare(&self, opts: &Options, with_key: bool) -> Result<(Options, Arc<dyn Shipper>)> {
        let mut opts = opts.clone();
        opts.cfg_name = self.resolve_cfg_name(&opts).await?;
        if with_key {
            opts.key = normalize_key(&opts.key)?;
        }
        let shipper = self.registry.resolve(&opts)?;
        Ok((opts, shipper))
    }

    /// Options for configuration management, which never fall back to the working configuration
    fn prepare_cfg(&self, opts: &Options) -> Result<Arc<dyn Shipper>> {
        if opts.cfg_name.is_empty() {
            return Err(CfgError::MissingConfigName);
        }
        self.registry.resolve(opts)
    }

    async fn bump_config_version(&self, shipper: &dyn Shipper, opts: &Options) -> Result<()> {
        shipper.update_config_version(opts).await.map_err(|e| {
            CfgError::backend(format!(
                "key '{}' was written but the version of configuration '{}' was not updated: {}",
                opts.key, opts.cfg_name, e
            ))
        })
    }

    pub async fn create_cfg(&self, opts: &Options, settings: &Settings) -> Result<ResponseObject> {
        let shipper = self.prepare_cfg(opts)?;
        let details = shipper.create_config(opts, settings).await?;

        let mut resp = ResponseObject::new(ACTION_CREATE);
        resp.message = "Successfully created the configuration".to_string();
        resp.cfg_state = state_of(&details);
        resp.details = Some(details);
        Ok(resp)
    }

    pub async fn delete_cfg(&self, opts: &Options) -> Result<ResponseObject> {
        let shipper = self.prepare_cfg(opts)?;
        let details = shipper.delete_config(opts).await?;

        let mut resp = ResponseObject::new(ACTION_DELETE_CFG);
        resp.message = "Successfully deleted the configuration".to_string();
        resp.details = Some(details);
        Ok(resp)
    }

    pub async fn update_cfg(&self, opts: &Options, settings: &Settings) -> Result<ResponseObject> {
        if settings.is_empty() {
            return Err(CfgError::MissingArguments);
        }
        let shipper = self.prepare_cfg(opts)?;
        let details = shipper.update_config(opts, settings).await?;

        let mut resp = ResponseObject::new(ACTION_UPDATE_CFG);
        resp.message = "Successfully updated the configuration".to_string();
        resp.cfg_state = state_of(&details);
        resp.details = Some(details);
        Ok(resp)
    }

    /// Record `cfg_name` as the working configuration
    pub async fn use_cfg(&self, cfg_name: &str) -> Result<ResponseObject> {
        if cfg_name.is_empty() {
            return Err(CfgError::MissingConfigName);
        }
        self.working.write(cfg_name).await?;
        info!(cfg = %cfg_name, "Working configuration set");

        let mut resp = ResponseObject::new(ACTION_USE);
        resp.message = format!("Set current working configuration to {cfg_name}");
        resp.current_cfg = cfg_name.to_string();
        Ok(resp)
    }

    pub async fn which(&self) -> Result<ResponseObject> {
        let current = self
            .working
            .read()
            .await?
            .ok_or(CfgError::NoCurrentWorkingConfig)?;

        let mut resp = ResponseObject::new(ACTION_WHICH);
        resp.message = format!("Current working configuration: {current}");
        resp.current_cfg = current;
        Ok(resp)
    }

    pub async fn set_key(&self, opts: &Options) -> Result<ResponseObject> {
        if opts.value.as_ref().is_none_or(|v| v.is_empty()) {
            return Err(CfgError::ValueRequired);
        }
        let (opts, shipper) = self.prepare(opts, true).await?;

        let written = shipper.update(&opts).await?;
        self.bump_config_version(shipper.as_ref(), &opts).await?;

        let previous = written.previous;
        let mut resp = ResponseObject::new(ACTION_SET);
        resp.item = Item {
            version: if previous.is_empty() { 1 } else { previous.version + 1 },
            ..without_cfg_metadata(written.current)
        };
        if !previous.is_empty() {
            resp.prev_item = without_cfg_metadata(previous);
        }

        debug!(cfg = %opts.cfg_name, key = %opts.key, version = resp.item.version, "Key set");
        Ok(resp)
    }

    pub async fn get_key(&self, opts: &Options) -> Result<ResponseObject> {
        let (opts, shipper) = self.prepare(opts, true).await?;

        let mut resp = ResponseObject::new(ACTION_GET);
        // The root record can hold only configuration metadata; that is still a miss
        match shipper.get(&opts).await?.filter(|item| !item.is_empty()) {
            Some(item) => resp.item = without_cfg_metadata(item),
            None => {
                resp.item = Item::empty(&opts.key);
                resp.error_code = KEY_NOT_FOUND.code;
                resp.message = format!("Key '{}' not found", opts.key);
            }
        }
        Ok(resp)
    }

    pub async fn delete_key(&self, opts: &Options) -> Result<ResponseObject> {
        let (opts, shipper) = self.prepare(opts, true).await?;

        let previous = shipper.delete(&opts).await?;

        let mut resp = ResponseObject::new(ACTION_DELETE);
        if previous.is_empty() {
            // Nothing was stored, so nothing changed
            resp.item = Item::empty(&opts.key);
            resp.error_code = KEY_NOT_FOUND.code;
            resp.message = format!("Key '{}' not found", opts.key);
            return Ok(resp);
        }

        self.bump_config_version(shipper.as_ref(), &opts).await?;

        resp.item = Item {
            key: opts.key.clone(),
            value: None,
            version: previous.version + 1,
            ..Default::default()
        };
        resp.prev_item = Item {
            key: opts.key.clone(),
            value: previous.value,
            version: previous.version,
            ..Default::default()
        };

        debug!(cfg = %opts.cfg_name, key = %opts.key, "Key deleted");
        Ok(resp)
    }

    /// Aggregate version, modification time and state of a configuration
    ///
    /// When `settings` is given they are applied first, so the response
    /// reflects the updated configuration.
    pub async fn info(&self, opts: &Options, settings: Option<&Settings>) -> Result<ResponseObject> {
        let mut opts = opts.clone();
        opts.key = ROOT_KEY.to_string();
        let (opts, shipper) = self.prepare(&opts, false).await?;

        let mut resp = ResponseObject::new(ACTION_INFO);
        if let Some(settings) = settings.filter(|s| !s.is_empty()) {
            resp.details = Some(shipper.update_config(&opts, settings).await?);
        }

        let root = shipper.get(&opts).await?.unwrap_or_default();
        resp.cfg_state = shipper.config_state(&opts).await?;
        resp.cfg_version = root.cfg_version;
        resp.cfg_modified_nanoseconds = root.cfg_modified_nanos;
        resp.cfg_modified = root.cfg_modified_nanos / NANOS_PER_SECOND;

        let modified = DateTime::<Utc>::from_timestamp(resp.cfg_modified, 0).unwrap_or_default();
        resp.cfg_modified_parsed = modified.to_rfc3339_opts(SecondsFormat::Secs, true);
        resp.message = format!(
            "{} version {} last modified {}",
            opts.cfg_name,
            resp.cfg_version,
            modified.format("%a, %d %b %Y %H:%M:%S UTC")
        );
        Ok(resp)
    }

    pub async fn export(&self, _opts: &Options) -> Result<ResponseObject> {
        Err(CfgError::Unsupported(ACTION_EXPORT))
    }
}

fn state_of(details: &serde_json::Value) -> String {
    details
        .get("state")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn without_cfg_metadata(item: Item) -> Item {
    Item {
        cfg_version: 0,
        cfg_modified_nanos: 0,
        ..item
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use cfgship_persistence::MemoryShipper;

    use super::*;

    async fn commands(dir: &TempDir) -> Commands {
        let mut registry = ShipperRegistry::new();
        registry.register("memory", Arc::new(MemoryShipper::new()));
        let commands = Commands::new(Arc::new(registry), WorkingConfigFile::in_dir(dir.path()));
        commands
            .create_cfg(&Options::new("app").with_storage("memory"), &Settings::new())
            .await
            .unwrap();
        commands
    }

    fn opts(key: &str) -> Options {
        Options::new("app").with_storage("memory").with_key(key)
    }

    #[tokio::test]
    async fn test_set_key_validation_order() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;

        // No value beats every other problem
        let err = commands
            .set_key(&Options::new("").with_key("bad key"))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::ValueRequired));

        let err = commands
            .set_key(&Options::new("").with_key("bad key").with_value("v"))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::MissingConfigName));

        let err = commands
            .set_key(&Options::new("app").with_key("bad key").with_value("v"))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::InvalidKeyName(_)));

        let err = commands
            .set_key(&Options::new("app").with_key("").with_value("v"))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::MissingKeyName));

        let err = commands
            .set_key(
                &Options::new("app")
                    .with_storage("nosuch")
                    .with_key("k")
                    .with_value("v"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::InvalidStorageEngine(_)));
    }

    #[tokio::test]
    async fn test_empty_value_is_required() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;
        let err = commands
            .set_key(&opts("k").with_value(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::ValueRequired));
    }

    #[tokio::test]
    async fn test_set_key_normalizes_key() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;

        let resp = commands.set_key(&opts("app/db/").with_value("x")).await.unwrap();
        assert_eq!(resp.item.key, "app/db");

        let resp = commands.get_key(&opts("app/db")).await.unwrap();
        assert_eq!(resp.item.value, Some(Bytes::from_static(b"x")));
    }

    #[tokio::test]
    async fn test_working_config_fallback() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;

        assert!(matches!(
            commands.which().await,
            Err(CfgError::NoCurrentWorkingConfig)
        ));

        let resp = commands.use_cfg("app").await.unwrap();
        assert_eq!(resp.current_cfg, "app");
        assert_eq!(commands.which().await.unwrap().current_cfg, "app");

        let resp = commands
            .set_key(&Options::new("").with_storage("memory").with_key("k").with_value("v"))
            .await
            .unwrap();
        assert_eq!(resp.item.version, 1);
    }

    #[tokio::test]
    async fn test_cfg_management_requires_explicit_name() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;
        commands.use_cfg("app").await.unwrap();

        let err = commands
            .delete_cfg(&Options::new("").with_storage("memory"))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgError::MissingConfigName));
    }

    #[tokio::test]
    async fn test_delete_missing_key() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;

        let resp = commands.delete_key(&opts("ghost")).await.unwrap();
        assert_eq!(resp.error_code, KEY_NOT_FOUND.code);

        // No mutation, no version bump
        let info = commands.info(&opts(""), None).await.unwrap();
        assert_eq!(info.cfg_version, 0);
    }

    #[tokio::test]
    async fn test_info_applies_settings_first() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;

        let mut settings = Settings::new();
        settings.insert("tier".to_string(), serde_json::json!("gold"));
        let resp = commands.info(&opts(""), Some(&settings)).await.unwrap();
        assert_eq!(resp.details.unwrap()["settings"]["tier"], "gold");
        assert_eq!(resp.cfg_state, "ACTIVE");
    }

    #[tokio::test]
    async fn test_export_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let commands = commands(&dir).await;
        assert!(matches!(
            commands.export(&opts("")).await,
            Err(CfgError::Unsupported("export"))
        ));
    }
}
