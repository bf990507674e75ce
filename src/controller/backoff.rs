//! # Exponential Backoff
//!
//! Bounded exponential backoff for reconcile retries after transient errors.
//!
//! The delay starts at a minimum, doubles after every consecutive failure and
//! is capped at a maximum. A successful pass resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use mcp_operator::controller::backoff::ExponentialBackoff;
//!
//! let mut backoff = ExponentialBackoff::new(1_000, 8_000);
//! assert_eq!(backoff.next_backoff_millis(), 1_000);
//! assert_eq!(backoff.next_backoff_millis(), 2_000);
//! assert_eq!(backoff.next_backoff_millis(), 4_000);
//! assert_eq!(backoff.next_backoff_millis(), 8_000);
//! assert_eq!(backoff.next_backoff_millis(), 8_000);
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Each call returns the current delay and doubles it for the next call,
/// saturating at `max_millis`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial delay (also the value after a reset)
    min_millis: u64,
    current_millis: u64,
    max_millis: u64,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `min_millis` and capped at `max_millis`
    ///
    /// A zero minimum is raised to one millisecond so the sequence still grows.
    #[must_use]
    pub fn new(min_millis: u64, max_millis: u64) -> Self {
        let min_millis = min_millis.max(1);
        Self {
            min_millis,
            current_millis: min_millis.min(max_millis.max(min_millis)),
            max_millis: max_millis.max(min_millis),
        }
    }

    /// Get the next delay in milliseconds and advance the sequence
    pub fn next_backoff_millis(&mut self) -> u64 {
        let result = self.current_millis;
        self.current_millis = self.current_millis.saturating_mul(2).min(self.max_millis);
        result
    }

    /// Get the next delay as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_millis(self.next_backoff_millis())
    }

    /// Reset to the initial delay
    pub fn reset(&mut self) {
        self.current_millis = self.min_millis;
    }
}
