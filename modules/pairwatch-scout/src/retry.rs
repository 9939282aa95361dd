use std::time::Duration;

use rand::Rng;

/// Bounded linear backoff with additive jitter for batch lookups.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(10),
            max_jitter: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Wait after failed attempt `attempt` (1-based): `base * attempt + U(0, jitter)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..=self.max_jitter)
        };
        self.base_delay * attempt + jitter
    }

    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// A definite client error (4xx other than 429) won't improve on retry.
    /// Unknown status (transport failure) is retryable.
    pub fn should_retry(status: Option<u16>) -> bool {
        match status {
            Some(429) => true,
            Some(s) if (400..500).contains(&s) => false,
            _ => true,
        }
    }
}
