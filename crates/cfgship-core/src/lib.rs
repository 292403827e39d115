//! cfgship Core - Command orchestration
//!
//! The command layer every surface calls into: it resolves the target
//! configuration, normalizes keys, picks the storage engine from the
//! registry and shapes the response envelope.

pub mod commands;
pub mod model;
pub mod working;

pub use commands::Commands;
pub use model::ResponseObject;
pub use working::WorkingConfigFile;
