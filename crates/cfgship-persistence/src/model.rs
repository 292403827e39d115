//! Data models shared by every storage engine

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use cfgship_common::DEFAULT_STORAGE_ENGINE;

/// Engine-specific configuration settings, passed through opaquely
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Per-request parameters for a storage operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    pub cfg_name: String,
    pub key: String,
    pub value: Option<Bytes>,
    /// Seconds to live; 0 or less means unlimited
    pub ttl: i64,
    pub conditional_value: Option<Bytes>,
    pub storage_interface_name: String,
}

impl Options {
    pub fn new(cfg_name: impl Into<String>) -> Self {
        Self {
            cfg_name: cfg_name.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_condition(mut self, expected: impl Into<Bytes>) -> Self {
        self.conditional_value = Some(expected.into());
        self
    }

    pub fn with_storage(mut self, name: impl Into<String>) -> Self {
        self.storage_interface_name = name.into();
        self
    }

    /// Requested engine name, falling back to the built-in engine
    pub fn storage_name(&self) -> &str {
        if self.storage_interface_name.is_empty() {
            DEFAULT_STORAGE_ENGINE
        } else {
            &self.storage_interface_name
        }
    }
}

/// A single key-value entry as returned to callers
///
/// `cfg_version` and `cfg_modified_nanos` are only populated when the entry
/// is the root key and the configuration has been versioned at least once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Item {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_value"
    )]
    pub value: Option<Bytes>,
    #[serde(skip_serializing_if = "is_zero")]
    pub version: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub ttl: i64,
    /// Absolute expiry in Unix nanoseconds; 0 means never
    #[serde(
        rename = "expiration",
        skip_serializing_if = "is_zero",
        serialize_with = "serialize_expiration"
    )]
    pub expiration_nanos: i64,
    #[serde(skip)]
    pub cfg_version: i64,
    #[serde(skip)]
    pub cfg_modified_nanos: i64,
}

impl Item {
    /// An item with nothing but its key, used for "no previous item" and misses
    pub fn empty(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// True when the item carries no stored value and was never versioned
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.version == 0
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        (self.expiration_nanos > 0).then(|| DateTime::from_timestamp_nanos(self.expiration_nanos))
    }

    /// Value rendered the way it is presented in JSON output
    pub fn rendered_value(&self) -> Option<serde_json::Value> {
        self.value.as_deref().map(render_value)
    }
}

/// Outcome of a key write
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// State of the key immediately before the write
    pub previous: Item,
    /// State the write produced, including the computed expiration
    pub current: Item,
}

/// Render stored bytes for output
///
/// JSON objects and arrays are embedded as-is, UTF-8 text becomes a string,
/// anything else is base64-encoded.
pub fn render_value(bytes: &[u8]) -> serde_json::Value {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(bytes)
        && (json.is_object() || json.is_array())
    {
        return json;
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => serde_json::Value::String(text.to_string()),
        Err(_) => serde_json::Value::String(BASE64.encode(bytes)),
    }
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn serialize_value<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => render_value(bytes).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

fn serialize_expiration<S: Serializer>(nanos: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    DateTime::from_timestamp_nanos(*nanos)
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_storage_name_default() {
        let opts = Options::new("app");
        assert_eq!(opts.storage_name(), "rocksdb");

        let opts = Options::new("app").with_storage("memory");
        assert_eq!(opts.storage_name(), "memory");
    }

    #[test]
    fn test_item_is_empty() {
        assert!(Item::empty("k").is_empty());

        let item = Item {
            key: "k".to_string(),
            value: Some(Bytes::from_static(b"v")),
            version: 1,
            ..Default::default()
        };
        assert!(!item.is_empty());
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(b"hello"), serde_json::json!("hello"));
        assert_eq!(
            render_value(br#"{"port": 5432}"#),
            serde_json::json!({"port": 5432})
        );
        assert_eq!(render_value(b"[1,2]"), serde_json::json!([1, 2]));
        // Scalars stay text
        assert_eq!(render_value(b"42"), serde_json::json!("42"));
        assert_eq!(render_value(&[0xff, 0xfe]), serde_json::json!("//4="));
    }

    #[test]
    fn test_item_serialization() {
        let item = Item {
            key: "greeting".to_string(),
            value: Some(Bytes::from_static(b"hello")),
            version: 2,
            ttl: 60,
            expiration_nanos: 1_464_675_792_991_825_937,
            cfg_version: 9,
            cfg_modified_nanos: 1,
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "greeting",
                "value": "hello",
                "version": 2,
                "ttl": 60,
                "expiration": "2016-05-31T06:23:12.991825937Z"
            })
        );
    }

    #[test]
    fn test_empty_item_serialization_omits_fields() {
        let json = serde_json::to_value(Item::empty("missing")).unwrap();
        assert_eq!(json, serde_json::json!({"key": "missing"}));
    }
}
