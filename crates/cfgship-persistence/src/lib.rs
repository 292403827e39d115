//! cfgship Persistence - Storage engine contract and storage engines
//!
//! This crate provides:
//! - The `Shipper` trait every storage engine implements
//! - The `ShipperRegistry` that resolves engines by name
//! - The versioning and expiration protocol shared by all engines
//! - An embedded RocksDB engine (built-in) and an in-memory engine

pub mod clock;
pub mod embedded;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod traits;
pub mod versioning;

// Re-export the engine contract
pub use traits::Shipper;

// Re-export registry
pub use registry::ShipperRegistry;

// Re-export engines
pub use embedded::{RocksDbOptions, RocksDbShipper};
pub use memory::MemoryShipper;

// Re-export time sources
pub use clock::{Clock, ManualClock, SystemClock};

// Re-export model types
pub use model::{Item, Options, Settings, WriteOutcome};
