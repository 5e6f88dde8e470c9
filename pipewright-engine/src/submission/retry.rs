use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transient execution-service failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Adds up to 50% random delay on top of the computed backoff, still
    /// bounded by `max_delay_ms`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retrying after the failed `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay_ms);

        let jitter_ms = if self.jitter && delay_ms > 0 {
            rand::rng().random_range(0..=delay_ms / 2)
        } else {
            0
        };

        Duration::from_millis(delay_ms.saturating_add(jitter_ms).min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: false,
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(64), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..RetryPolicy::default()
        };

        for _ in 0..50 {
            let delay = policy.backoff(2);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_500));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: true,
        };

        for _ in 0..50 {
            assert!(policy.backoff(8) <= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn test_immediate_never_sleeps() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.attempts(), 3);
        assert_eq!(RetryPolicy::immediate(0).attempts(), 1);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 6\n").unwrap();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.base_delay_ms, 500);
        assert!(policy.jitter);
    }
}
