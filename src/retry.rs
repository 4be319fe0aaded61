//! Bounded retry backoff
//!
//! Exponential backoff with jitter, capped interval, and a hard budget of
//! consecutive failures. A chain that cannot make progress becomes an
//! observable error instead of a silent infinite stall.

use rand::Rng;
use std::time::Duration;

/// Retry parameters shared by the range scanner and live subscriber.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// First delay.
    pub initial: Duration,
    /// Cap on the exponential delay, before jitter.
    pub max: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_consecutive_failures: 10,
        }
    }
}

/// Consecutive-failure tracker producing the next wait interval.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Forget accumulated failures after a success.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the delay before the next attempt,
    /// or None when the failure budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.failures >= self.policy.max_consecutive_failures {
            return None;
        }

        let exponent = self.failures.min(16);
        self.failures += 1;

        let base_ms = self
            .policy
            .initial
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.policy.max.as_millis()) as u64;

        // up to +50% jitter to spread reconnect storms
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 2 + 1);
        Some(Duration::from_millis(base_ms + jitter_ms))
    }
}
