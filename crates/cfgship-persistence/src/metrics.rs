// Storage engine metrics
// Counters are labelled with the engine that recorded them

use metrics::{counter, describe_counter};

use cfgship_common::CfgError;

pub const ITEMS_EXPIRED: &str = "cfgship_items_expired_total";
pub const CONDITION_FAILURES: &str = "cfgship_condition_failures_total";
pub const CONFIG_VERSION_BUMPS: &str = "cfgship_config_version_bumps_total";

/// Initialize metric descriptions
/// Should be called once at application startup
pub fn describe_metrics() {
    describe_counter!(ITEMS_EXPIRED, "Total number of items removed after their TTL elapsed");
    describe_counter!(
        CONDITION_FAILURES,
        "Total number of writes and deletes rejected by a conditional check"
    );
    describe_counter!(
        CONFIG_VERSION_BUMPS,
        "Total number of configuration version increments"
    );
}

pub fn record_item_expired(engine: &'static str) {
    counter!(ITEMS_EXPIRED, "engine" => engine).increment(1);
}

pub fn record_version_bump(engine: &'static str) {
    counter!(CONFIG_VERSION_BUMPS, "engine" => engine).increment(1);
}

/// Count the error if it is a failed conditional check
pub fn record_if_condition_failed(engine: &'static str, err: &CfgError) {
    if matches!(err, CfgError::ConditionFailed(_)) {
        counter!(CONDITION_FAILURES, "engine" => engine).increment(1);
    }
}
