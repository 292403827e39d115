//! Item versioning, conditional writes and TTL expiration
//!
//! Every engine stores one `StoredRecord` per key and runs the functions in
//! this module while holding whatever per-key exclusion it provides. The
//! functions are pure so the protocol behaves identically across engines.
//!
//! The root key doubles as the holder of the configuration's aggregate
//! version (`cfg_version`, `cfg_modified`). Item writes never touch those
//! attributes and version bumps never touch the item attributes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use cfgship_common::{CfgError, Result};

use crate::model::{Item, Options};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// On-disk representation of a key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(default, with = "value_b64", skip_serializing_if = "Option::is_none")]
    pub value: Option<Bytes>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub ttl: i64,
    /// Absolute expiry in Unix nanoseconds; 0 means never
    #[serde(default)]
    pub expires: i64,
    #[serde(default)]
    pub cfg_version: i64,
    #[serde(default)]
    pub cfg_modified: i64,
}

impl StoredRecord {
    pub fn is_expired(&self, now_nanos: i64) -> bool {
        self.expires > 0 && self.expires <= now_nanos
    }

    /// Whether the record carries configuration-level version metadata
    pub fn has_cfg_metadata(&self) -> bool {
        self.cfg_version > 0
    }

    pub fn to_item(&self, key: &str) -> Item {
        Item {
            key: key.to_string(),
            value: self.value.clone(),
            version: self.version,
            ttl: self.ttl,
            expiration_nanos: self.expires,
            cfg_version: self.cfg_version,
            cfg_modified_nanos: self.cfg_modified,
        }
    }

    /// Same record with item attributes cleared and cfg metadata kept
    fn without_item(&self) -> Option<StoredRecord> {
        self.has_cfg_metadata().then(|| StoredRecord {
            cfg_version: self.cfg_version,
            cfg_modified: self.cfg_modified,
            ..Default::default()
        })
    }
}

/// Result of evaluating a stored record at read time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    pub item: Option<Item>,
    /// The record had expired and the engine should clean it up
    pub expired: bool,
}

/// Absolute expiration for a TTL in seconds; 0 for unlimited
pub fn expiration_for(ttl: i64, now_nanos: i64) -> i64 {
    if ttl <= 0 {
        return 0;
    }
    now_nanos.saturating_add(ttl.saturating_mul(NANOS_PER_SECOND))
}

/// Conditional check shared by writes and deletes
///
/// A condition only passes when the record exists and its current value is
/// byte-equal to the expected value.
pub fn check_condition(key: &str, existing: Option<&StoredRecord>, expected: Option<&[u8]>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    match existing.and_then(|r| r.value.as_deref()) {
        Some(current) if current == expected => Ok(()),
        _ => Err(CfgError::ConditionFailed(key.to_string())),
    }
}

/// Apply a value write
///
/// Returns the record to store and the previous state of the key. The
/// previous state reflects the raw stored record, even if it has expired
/// but has not been cleaned up yet.
pub fn apply_write(
    key: &str,
    existing: Option<&StoredRecord>,
    opts: &Options,
    now_nanos: i64,
) -> Result<(StoredRecord, Item)> {
    check_condition(key, existing, opts.conditional_value.as_deref())?;

    let previous = existing.map(|r| r.to_item(key)).unwrap_or_else(|| Item::empty(key));
    let ttl = opts.ttl.max(0);

    let record = StoredRecord {
        value: opts.value.clone(),
        version: previous.version + 1,
        ttl,
        expires: expiration_for(ttl, now_nanos),
        cfg_version: previous.cfg_version,
        cfg_modified: previous.cfg_modified_nanos,
    };

    Ok((record, previous))
}

/// Apply a key deletion
///
/// Returns what remains stored for the key (the root key keeps its cfg
/// metadata) and the previous state of the key.
pub fn apply_delete(
    key: &str,
    existing: Option<&StoredRecord>,
    expected: Option<&[u8]>,
) -> Result<(Option<StoredRecord>, Item)> {
    check_condition(key, existing, expected)?;

    match existing {
        Some(record) => Ok((record.without_item(), record.to_item(key))),
        None => Ok((None, Item::empty(key))),
    }
}

/// Bump the aggregate configuration version held on the root record
pub fn apply_config_bump(existing: Option<&StoredRecord>, now_nanos: i64) -> StoredRecord {
    let mut record = existing.cloned().unwrap_or_default();
    record.cfg_version += 1;
    record.cfg_modified = now_nanos;
    record
}

/// Evaluate a record for a read, applying lazy expiration
pub fn read_record(key: &str, record: Option<&StoredRecord>, now_nanos: i64) -> ReadOutcome {
    match record {
        None => ReadOutcome {
            item: None,
            expired: false,
        },
        Some(record) if record.is_expired(now_nanos) => ReadOutcome {
            item: record.without_item().map(|r| r.to_item(key)),
            expired: true,
        },
        Some(record) => ReadOutcome {
            item: Some(record.to_item(key)),
            expired: false,
        },
    }
}

/// Cleanup for an expired record, re-checked under the engine's key lock
///
/// Returns `None` if the record is no longer expired (it was rewritten in
/// the meantime), otherwise what should remain stored.
pub fn expire_record(record: &StoredRecord, now_nanos: i64) -> Option<Option<StoredRecord>> {
    record.is_expired(now_nanos).then(|| record.without_item())
}

mod value_b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|e| BASE64.decode(e).map(Bytes::from).map_err(serde::de::Error::custom))
            .transpose()
    }
}
