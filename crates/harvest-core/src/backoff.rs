use std::time::Duration;

/// Exponential retry policy for transient ingest failures.
///
/// The delay before retry `n` (1-based) is `unit * base^n`; with the defaults
/// that is 5s before the second attempt and 25s before the third.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total number of attempts per batch, including the first one.
    pub max_attempts: u32,
    /// Growth base of the delay.
    pub base: u32,
    /// Delay unit multiplied by `base^n`.
    pub unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: 5,
            unit: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the `retry`-th failed attempt.
    ///
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base
            .checked_pow(retry)
            .and_then(|factor| self.unit.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Returns `true` if another attempt is allowed after `attempt` failed.
    #[inline]
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
