//! Key name validation and normalization
//!
//! Keys are flat strings. Slashes are allowed so callers can follow a
//! path-like naming convention, but no hierarchy is implied.

use std::sync::LazyLock;

use crate::ROOT_KEY;
use crate::error::{CfgError, Result};

/// Word characters, slash and hyphen only
static VALID_KEY_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_/\-]+$").expect("Invalid regex pattern"));

/// Validate and canonicalize a key name
///
/// Trailing slashes are stripped, except for the root key `/` itself.
///
/// # Examples
///
/// ```
/// use cfgship_common::normalize_key;
///
/// assert_eq!(normalize_key("app/db/").unwrap(), "app/db");
/// assert_eq!(normalize_key("/").unwrap(), "/");
/// assert!(normalize_key("with spaces").is_err());
/// ```
pub fn normalize_key(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Err(CfgError::MissingKeyName);
    }

    if !VALID_KEY_PATTERN.is_match(raw) {
        return Err(CfgError::InvalidKeyName(raw.to_string()));
    }

    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(ROOT_KEY.to_string());
    }

    Ok(trimmed.to_string())
}
