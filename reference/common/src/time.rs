//! Time utilities and constants for SwapSettle.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// How long a quote stays confirmable (14 seconds).
    pub fn quote_ttl() -> Duration {
        Duration::seconds(14)
    }

    /// Skew allowance past a quote's expiry (2 seconds).
    pub fn confirmation_grace() -> Duration {
        Duration::seconds(2)
    }

    /// Upstream rate cache lifetime (5 seconds). Must stay below the quote TTL.
    pub fn rate_cache_ttl() -> Duration {
        Duration::seconds(5)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `deadline` plus `grace` lies strictly before `at`.
pub fn is_past(deadline: Timestamp, grace: Duration, at: Timestamp) -> bool {
    at > deadline + grace
}

/// Source of the current time.
///
/// Expiry is evaluated lazily against this clock, never by a timer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock stopped at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_past_with_grace() {
        let deadline = now();
        let grace = constants::confirmation_grace();

        assert!(!is_past(deadline, grace, deadline));
        assert!(!is_past(deadline, grace, deadline + grace));
        assert!(is_past(
            deadline,
            grace,
            deadline + grace + Duration::milliseconds(1)
        ));
    }

    #[test]
    fn test_manual_clock() {
        let start = now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(3));
        assert_eq!(clock.now(), start + Duration::seconds(3));
    }

    #[test]
    fn test_cache_ttl_below_quote_ttl() {
        assert!(constants::rate_cache_ttl() < constants::quote_ttl());
    }
}
