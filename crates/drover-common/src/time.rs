//! Clock access for drover.
//!
//! Consensus timing must be testable, so all time queries go through the
//! [`Clock`] trait: [`SystemClock`] for production, [`VirtualClock`] for
//! deterministic tests where the caller advances time by hand.

use parking_lot::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Monotonic and wall-clock time queries.
pub trait Clock: Send + Sync {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Wall clock, seconds since epoch.
    fn unix_time(&self) -> u64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        current_timestamp()
    }
}

/// A clock that only moves when told to.
///
/// Both the monotonic reading and the wall-clock reading advance together
/// from a fixed base, so tests can pin "now" exactly.
pub struct VirtualClock {
    base_instant: Instant,
    base_unix: u64,
    offset: Mutex<Duration>,
}

impl VirtualClock {
    /// Create a virtual clock starting at the given Unix time.
    pub fn starting_at(base_unix: u64) -> Self {
        Self {
            base_instant: Instant::now(),
            base_unix,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Set the elapsed time since the base.
    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.offset.lock() = elapsed;
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.offset.lock()
    }

    fn unix_time(&self) -> u64 {
        self.base_unix + self.offset.lock().as_secs()
    }
}
