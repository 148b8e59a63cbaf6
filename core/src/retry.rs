//! Bounded retry for timed lock acquisition.
//!
//! Every lock in the lifecycle layer is taken with a bounded number of timed
//! attempts instead of an unbounded wait. Stalling the graphics thread is
//! worse than a rare best-effort fallback, so callers decide what to do when
//! [`RetryPolicy::retry`] gives up.

use std::time::Duration;

/// How many times to attempt an acquisition and how long each attempt waits.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ember_core::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(1));
/// let mut calls = 0;
/// let value = policy.retry(|_wait| {
///     calls += 1;
///     (calls == 2).then_some(42)
/// });
/// assert_eq!(value, Some(42));
/// assert_eq!(calls, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RetryPolicy {
    /// Number of attempts before giving up. Zero is treated as one.
    pub attempts: u32,
    /// Timeout handed to each attempt.
    pub wait: Duration,
}

impl RetryPolicy {
    /// Default number of attempts.
    pub const DEFAULT_ATTEMPTS: u32 = 5;

    /// Default per-attempt timeout.
    pub const DEFAULT_WAIT: Duration = Duration::from_millis(2);

    /// Create a policy with the given attempt count and per-attempt timeout.
    pub const fn new(attempts: u32, wait: Duration) -> Self {
        Self { attempts, wait }
    }

    /// A policy that tries exactly once without waiting.
    pub const fn immediate() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Set the number of attempts.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Upper bound on the total time spent in [`retry`](Self::retry).
    pub fn budget(&self) -> Duration {
        self.wait.saturating_mul(self.attempts.max(1))
    }

    /// Run `attempt` until it returns `Some` or the attempts are exhausted.
    ///
    /// The closure receives the per-attempt timeout, typically forwarded to a
    /// `try_lock_for`-style call.
    pub fn retry<T>(&self, mut attempt: impl FnMut(Duration) -> Option<T>) -> Option<T> {
        for _ in 0..self.attempts.max(1) {
            if let Some(value) = attempt(self.wait) {
                return Some(value);
            }
        }
        None
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_WAIT)
    }
}
