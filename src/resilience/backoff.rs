//! Exponential backoff with jitter for accept-loop retries.

use rand::Rng;
use std::time::Duration;

/// First delay after a transient accept failure.
pub const ACCEPT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Ceiling for accept retry delays.
pub const ACCEPT_MAX_DELAY: Duration = Duration::from_secs(1);

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Tracks consecutive transient accept failures.
#[derive(Debug, Default)]
pub struct AcceptBackoff {
    failures: u32,
}

impl AcceptBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return how long to wait before accepting again.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        calculate_backoff(
            self.failures,
            ACCEPT_BASE_DELAY.as_millis() as u64,
            ACCEPT_MAX_DELAY.as_millis() as u64,
        )
    }

    /// Forget previous failures after a successful accept.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
