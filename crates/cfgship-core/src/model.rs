//! Response envelope returned by every command

use serde::Serialize;

use cfgship_common::CfgError;
use cfgship_persistence::Item;

/// Result of a command, ready to be rendered by any surface
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseObject {
    pub action: String,
    #[serde(skip_serializing_if = "is_unset")]
    pub item: Item,
    #[serde(skip_serializing_if = "is_unset")]
    pub prev_item: Item,
    #[serde(skip_serializing_if = "is_zero_code")]
    pub error_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub current_cfg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub cfg_version: i64,
    /// Seconds since the Unix epoch
    #[serde(skip_serializing_if = "is_zero")]
    pub cfg_modified: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub cfg_modified_nanoseconds: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cfg_modified_parsed: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cfg_state: String,
    /// Engine-specific result of a configuration create, update or delete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ResponseObject {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Default::default()
        }
    }

    /// Envelope describing a failed command
    pub fn from_error(action: &str, err: &CfgError) -> Self {
        Self {
            action: action.to_string(),
            error_code: err.error_code().code,
            error: err.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

fn is_unset(item: &Item) -> bool {
    *item == Item::default()
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_zero_code(n: &i32) -> bool {
    *n == 0
}
