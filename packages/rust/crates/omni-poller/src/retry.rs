//! Retry policy for failed fetches.
//!
//! The default policy retries forever with no delay between attempts.

use std::time::Duration;

const MAX_BACKOFF_SHIFT: u32 = 20;

/// Delay curve applied between failed fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// `min(base * 2^(failures - 1), max)`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Upper bound for any single delay.
        max: Duration,
    },
}

/// How a poller reacts to consecutive fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Give up after this many consecutive failures; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay curve between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever, immediately.
    pub const fn unlimited() -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::None,
        }
    }

    /// Cap consecutive failures. Zero means unlimited.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = (max_attempts > 0).then_some(max_attempts);
        self
    }

    /// Replace the delay curve.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether `consecutive_failures` has used up the attempt budget.
    #[must_use]
    pub fn is_exhausted(&self, consecutive_failures: u32) -> bool {
        self.max_attempts
            .is_some_and(|max| consecutive_failures >= max)
    }

    /// Delay to wait after `consecutive_failures` failures in a row.
    #[must_use]
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Exponential { base, max } => {
                if consecutive_failures == 0 {
                    return Duration::ZERO;
                }
                let shift = (consecutive_failures - 1).min(MAX_BACKOFF_SHIFT);
                base.saturating_mul(1_u32 << shift).min(max)
            }
        }
    }
}
