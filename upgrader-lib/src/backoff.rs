//! Fibonacci backoff for engine-unavailable cycles.
//!
//! Grows more slowly than exponential backoff, which suits a poll loop that
//! should keep probing a briefly-restarting engine without hammering it.
//! With the defaults: 5s, 5s, 10s, 15s, 25s, 40s, 60s (cap).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs,
        }
    }

    /// Next delay in the sequence, capped at the maximum.
    pub fn next_delay(&mut self) -> Duration {
        let result = self.current_secs;
        let next = (self.prev_secs + self.current_secs).min(self.max_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next;
        Duration::from_secs(result)
    }

    /// Reset after a successful cycle.
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}
