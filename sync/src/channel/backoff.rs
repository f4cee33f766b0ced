//! Reconnect backoff.
//!
//! `delay = min(base * factor^attempt, cap)`. There is no attempt limit: once
//! the cap is reached every further retry waits the capped delay.

use std::time::Duration;

use super::error::ChannelError;

/// Default base reconnect delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default reconnect delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Reconnect timing policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Multiplier applied per consecutive failure.
    pub backoff_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl ReconnectPolicy {
    /// Creates a new policy.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            backoff_factor,
        }
    }

    /// Returns the delay to wait before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the factor is below 1.0 or the cap is below the base.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ChannelError::InvalidConfig(
                "backoff_factor must be >= 1.0".to_string(),
            ));
        }

        if self.max_delay < self.base_delay {
            return Err(ChannelError::InvalidConfig(
                "max_delay must be >= base_delay".to_string(),
            ));
        }

        Ok(())
    }
}

/// Consecutive-failure tracker driving the reconnect loop.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    /// Creates a tracker starting at attempt zero.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of consecutive failures recorded since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay for the current attempt and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Resets after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
