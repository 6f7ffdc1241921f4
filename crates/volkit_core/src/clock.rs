//! Time sources for last-modified rewriting.

use crate::error::CoreResult;
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds in one day.
pub const NANOS_PER_DAY: u64 = 24 * 60 * 60 * 1_000_000_000;

/// Supplies last-modified timestamps.
pub trait TimeSource: Send + Sync {
    /// Returns a timestamp in unix seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if no timestamp can be produced.
    fn now_secs(&self) -> CoreResult<u64>;
}

/// The local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_secs(&self) -> CoreResult<u64> {
        Ok(unix_now_ns() / 1_000_000_000)
    }
}

/// Always returns the same timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTime(pub u64);

impl TimeSource for FixedTime {
    fn now_secs(&self) -> CoreResult<u64> {
        Ok(self.0)
    }
}

/// Current wall-clock time in unix nanoseconds; zero if the clock is set
/// before the epoch.
#[must_use]
pub fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs().unwrap() > 1_577_836_800);
    }

    #[test]
    fn fixed_time() {
        assert_eq!(FixedTime(42).now_secs().unwrap(), 42);
    }
}
