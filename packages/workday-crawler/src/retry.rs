//! Exponential backoff with jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ratelimit::FailureKind;

/// Backoff schedule for retrying one URL.
///
/// `delay(attempt) = min(base * f^attempt, max) + uniform(0, jitter)`, where
/// `f` is the steeper `rate_limit_factor` after a rate-limit signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub factor: f64,
    pub rate_limit_factor: f64,
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            rate_limit_factor: 3.0,
            jitter: Duration::from_millis(500),
        }
    }
}

impl BackoffPolicy {
    /// A policy with no waiting, for tests.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            rate_limit_factor: 1.0,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-based) without jitter.
    pub fn base_delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        let factor = match kind {
            FailureKind::RateLimited => self.rate_limit_factor,
            _ => self.factor,
        }
        .max(1.0);
        let exponent = attempt.min(32) as i32;
        let secs = self.base.as_secs_f64() * factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max.as_secs_f64()))
    }

    /// Delay before retry number `attempt` (0-based), jitter included.
    pub fn delay(&self, attempt: u32, kind: FailureKind) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..=jitter_ms))
        };
        self.base_delay(attempt, kind) + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_capped() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(0, FailureKind::Other), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1, FailureKind::Other), Duration::from_secs(2));
        assert_eq!(policy.base_delay(2, FailureKind::Timeout), Duration::from_secs(4));
        assert_eq!(policy.base_delay(10, FailureKind::Other), Duration::from_secs(30));
    }

    #[test]
    fn test_rate_limit_uses_steeper_factor() {
        let policy = BackoffPolicy::default();
        assert_eq!(
            policy.base_delay(2, FailureKind::RateLimited),
            Duration::from_secs(9)
        );
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = BackoffPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(1, FailureKind::Other);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_immediate_policy_never_waits() {
        let policy = BackoffPolicy::immediate();
        assert_eq!(policy.delay(5, FailureKind::RateLimited), Duration::ZERO);
    }
}
