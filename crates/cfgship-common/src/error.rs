//! Error types and error codes for cfgship
//!
//! This module defines:
//! - `CfgError`: Application-specific error enum
//! - `ErrorCode`: Structured error codes for responses

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum CfgError {
    #[error("not enough arguments passed")]
    MissingArguments,

    #[error("missing key name")]
    MissingKeyName,

    #[error("invalid key name '{0}'")]
    InvalidKeyName(String),

    #[error("missing configuration name")]
    MissingConfigName,

    #[error("a value is required")]
    ValueRequired,

    #[error("invalid storage engine '{0}'")]
    InvalidStorageEngine(String),

    #[error("conditional check failed for key '{0}'")]
    ConditionFailed(String),

    #[error("configuration '{0}' not exist")]
    ConfigNotExist(String),

    #[error("configuration '{0}' already exist")]
    ConfigAlreadyExist(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("no current working configuration has been set at this path")]
    NoCurrentWorkingConfig,

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("storage backend error: {0}")]
    BackendFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CfgError {
    /// Wrap any backend error, keeping its message verbatim
    pub fn backend(err: impl std::fmt::Display) -> Self {
        CfgError::BackendFailure(err.to_string())
    }

    /// Whether the error was raised by input validation, before any storage call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CfgError::MissingArguments
                | CfgError::MissingKeyName
                | CfgError::InvalidKeyName(_)
                | CfgError::MissingConfigName
                | CfgError::ValueRequired
                | CfgError::InvalidStorageEngine(_)
                | CfgError::InvalidSettings(_)
        )
    }

    /// Structured code for this error
    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            CfgError::MissingArguments => MISSING_ARGUMENTS,
            CfgError::MissingKeyName => MISSING_KEY_NAME,
            CfgError::InvalidKeyName(_) => INVALID_KEY_NAME,
            CfgError::MissingConfigName => MISSING_CONFIG_NAME,
            CfgError::ValueRequired => VALUE_REQUIRED,
            CfgError::InvalidStorageEngine(_) => INVALID_STORAGE_ENGINE,
            CfgError::ConditionFailed(_) => CONDITION_FAILED,
            CfgError::ConfigNotExist(_) => CONFIG_NOT_EXIST,
            CfgError::ConfigAlreadyExist(_) => CONFIG_ALREADY_EXIST,
            CfgError::InvalidSettings(_) => INVALID_SETTINGS,
            CfgError::NoCurrentWorkingConfig => NO_CURRENT_WORKING_CONFIG,
            CfgError::Unsupported(_) => UNSUPPORTED,
            CfgError::BackendFailure(_) | CfgError::Io(_) => BACKEND_FAILURE,
        }
    }
}

/// Result type alias for cfgship operations
pub type Result<T> = std::result::Result<T, CfgError>;

/// Error code structure for responses
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const KEY_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 100,
    message: "key not found",
};

// Input validation errors
pub const MISSING_ARGUMENTS: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "missing arguments",
};

pub const MISSING_KEY_NAME: ErrorCode<'static> = ErrorCode {
    code: 10001,
    message: "missing key name",
};

pub const INVALID_KEY_NAME: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "invalid key name",
};

pub const MISSING_CONFIG_NAME: ErrorCode<'static> = ErrorCode {
    code: 10003,
    message: "missing configuration name",
};

pub const VALUE_REQUIRED: ErrorCode<'static> = ErrorCode {
    code: 10004,
    message: "value required",
};

pub const INVALID_SETTINGS: ErrorCode<'static> = ErrorCode {
    code: 10005,
    message: "invalid settings",
};

pub const NO_CURRENT_WORKING_CONFIG: ErrorCode<'static> = ErrorCode {
    code: 10006,
    message: "no current working configuration",
};

// Storage errors
pub const INVALID_STORAGE_ENGINE: ErrorCode<'static> = ErrorCode {
    code: 20001,
    message: "invalid storage engine",
};

pub const CONDITION_FAILED: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "conditional check failed",
};

pub const CONFIG_NOT_EXIST: ErrorCode<'static> = ErrorCode {
    code: 20003,
    message: "configuration not exist",
};

pub const CONFIG_ALREADY_EXIST: ErrorCode<'static> = ErrorCode {
    code: 20004,
    message: "configuration already exist",
};

pub const UNSUPPORTED: ErrorCode<'static> = ErrorCode {
    code: 20005,
    message: "unsupported operation",
};

pub const BACKEND_FAILURE: ErrorCode<'static> = ErrorCode {
    code: 30000,
    message: "storage backend failure",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CfgError::MissingKeyName.to_string(), "missing key name");
        assert_eq!(
            CfgError::InvalidStorageEngine("dynamo".to_string()).to_string(),
            "invalid storage engine 'dynamo'"
        );
        assert_eq!(
            CfgError::backend("throughput exceeded").to_string(),
            "storage backend error: throughput exceeded"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            CfgError::MissingArguments.error_code(),
            CfgError::MissingKeyName.error_code(),
            CfgError::InvalidKeyName(String::new()).error_code(),
            CfgError::MissingConfigName.error_code(),
            CfgError::ValueRequired.error_code(),
            CfgError::InvalidStorageEngine(String::new()).error_code(),
            CfgError::ConditionFailed(String::new()).error_code(),
            CfgError::ConfigNotExist(String::new()).error_code(),
            CfgError::ConfigAlreadyExist(String::new()).error_code(),
            CfgError::InvalidSettings(String::new()).error_code(),
            CfgError::NoCurrentWorkingConfig.error_code(),
            CfgError::Unsupported("export").error_code(),
            CfgError::BackendFailure(String::new()).error_code(),
        ];
        let mut seen: Vec<i32> = codes.iter().map(|c| c.code).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), codes.len());
    }

    #[test]
    fn test_is_validation() {
        assert!(CfgError::ValueRequired.is_validation());
        assert!(CfgError::InvalidKeyName("a b".to_string()).is_validation());
        assert!(!CfgError::ConditionFailed("k".to_string()).is_validation());
        assert!(!CfgError::backend("boom").is_validation());
    }

    #[test]
    fn test_io_error_maps_to_backend_code() {
        let err: CfgError = std::io::Error::other("disk full").into();
        assert_eq!(err.error_code(), BACKEND_FAILURE);
    }
}
