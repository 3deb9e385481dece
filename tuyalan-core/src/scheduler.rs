//! Send pacing and failure backoff
//!
//! The outbound queue is drained one message per tick. While sends succeed
//! the tick stays at [`queue::INITIAL_INTERVAL`]. After more than
//! [`queue::FAILURE_THRESHOLD`] consecutive failures the tick becomes
//!
//! ```text
//! min(INITIAL_BACKOFF × MULTIPLIER^(failures − 4), MAX_BACKOFF)
//! ```
//!
//! and stays there until the next successful send.

use std::time::Duration;

use crate::constants::queue;

/// Backoff state for one device's outbound queue
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    failures: u32,
    interval: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            failures: 0,
            interval: queue::INITIAL_INTERVAL,
        }
    }

    /// Consecutive failed sends
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next tick
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the failure threshold has been crossed
    pub fn is_backing_off(&self) -> bool {
        self.failures > queue::FAILURE_THRESHOLD
    }

    /// Reset after a successful send
    pub fn record_success(&mut self) {
        self.failures = 0;
        self.interval = queue::INITIAL_INTERVAL;
    }

    /// Count a failed send and return the resulting tick interval
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);

        if self.is_backing_off() {
            self.interval = Self::backoff_for(self.failures);
        }

        self.interval
    }

    /// Backoff interval for a failure count past the threshold
    pub fn backoff_for(failures: u32) -> Duration {
        let exponent = failures.saturating_sub(queue::FAILURE_THRESHOLD + 1);
        let secs = queue::INITIAL_BACKOFF_SECS * queue::BACKOFF_MULTIPLIER.powi(exponent.min(i32::MAX as u32) as i32);

        Duration::from_secs_f64(secs.min(queue::MAX_BACKOFF_SECS))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
