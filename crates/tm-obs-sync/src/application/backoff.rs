//! Capped exponential backoff for reconnect attempts.
//!
//! ```text
//! attempt:  1      2      3      4      5 ...
//! delay:    500ms  1s     2s     4s     8s ... capped at `max`
//! ```
//!
//! With `max_attempts = Some(n)` the backoff hands out `n` delays and then
//! returns `None`, meaning "give up".  A successful connection calls
//! [`Backoff::reset`] so the next outage starts from the initial delay again.

use std::time::Duration;

/// Shape of the reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Retries allowed before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// Stateful iterator over the delays of a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
    next: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next: policy.initial,
        }
    }

    /// Returns the delay before the next retry, or `None` when exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(limit) = self.policy.max_attempts {
            if self.attempts >= limit {
                return None;
            }
        }
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.next.min(self.policy.max);
        self.next = self
            .next
            .checked_mul(2)
            .unwrap_or(self.policy.max)
            .min(self.policy.max);
        Some(delay)
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts the schedule over.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next = self.policy.initial;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: Option<u32>) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            max_attempts,
        }
    }

    #[test]
    fn test_delays_double_until_cap() {
        // Arrange
        let mut backoff = Backoff::new(policy(None));

        // Act
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().unwrap().as_millis() as u64)
            .collect();

        // Assert
        assert_eq!(delays, vec![100, 200, 400, 500, 500, 500]);
    }

    #[test]
    fn test_attempt_limit_exhausts() {
        let mut backoff = Backoff::new(policy(Some(2)));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 2);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(policy(Some(1)));
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();

        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_initial_above_cap_is_capped() {
        let mut backoff = Backoff::new(BackoffPolicy {
            initial: Duration::from_secs(60),
            max: Duration::from_secs(5),
            max_attempts: None,
        });
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_default_policy_retries_forever() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        for _ in 0..1000 {
            assert!(backoff.next_delay().is_some());
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
    }
}
