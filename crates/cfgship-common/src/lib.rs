//! cfgship Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all cfgship components:
//! - Error types and error codes
//! - Key name normalization
//! - Common constants

pub mod error;
pub mod key;

// Re-exports for convenience
pub use error::{CfgError, ErrorCode, Result};
pub use key::normalize_key;

/// Key of the root item, which also holds the configuration's aggregate version metadata
pub const ROOT_KEY: &str = "/";

/// Storage engine used when none is requested
pub const DEFAULT_STORAGE_ENGINE: &str = "rocksdb";

/// File (relative to the working directory) recording the current working configuration
pub const WORKING_CFG_FILE: &str = ".cfgship";

/// Configuration state reported once a configuration is usable
pub const CFG_STATE_ACTIVE: &str = "ACTIVE";

/// Response action names
pub const ACTION_CREATE: &str = "create";
pub const ACTION_DELETE_CFG: &str = "delete cfg";
pub const ACTION_UPDATE_CFG: &str = "update cfg";
pub const ACTION_USE: &str = "use";
pub const ACTION_WHICH: &str = "which";
pub const ACTION_SET: &str = "set";
pub const ACTION_GET: &str = "get";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_INFO: &str = "info";
pub const ACTION_EXPORT: &str = "export";
pub const ACTION_VERSION: &str = "version";
