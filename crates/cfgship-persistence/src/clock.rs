//! Time sources for TTL evaluation and modification timestamps
//!
//! All timestamps are Unix nanoseconds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of "now" for storage engines
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in Unix nanoseconds
    fn now_nanos(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        // Saturates past the year 2262
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start_nanos),
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now_nanos())
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_add(delta))
            })
            .ok();
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_nanosecond_scale() {
        // 2020-01-01 in nanoseconds
        assert!(SystemClock.now_nanos() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_nanos(), 2_000_001_000);

        clock.set(5);
        assert_eq!(clock.now_nanos(), 5);
    }

    #[test]
    fn test_manual_clock_advance_saturates() {
        let clock = ManualClock::new(i64::MAX - 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_nanos(), i64::MAX);
    }
}
