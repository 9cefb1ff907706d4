//! Reconnect policy after an unsolicited link loss.
//!
//! By default the manager reconnects immediately and indefinitely for as
//! long as the radio is on and the peripheral is retained. A cap on the
//! number of attempts and exponential backoff can be configured.

use std::time::Duration;

use crate::error::{Error, Result};

/// Options for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectOptions {
    /// Maximum number of reconnection attempts (None = unlimited).
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (for exponential backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to use exponential backoff.
    pub use_exponential_backoff: bool,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_exponential_backoff: false,
        }
    }
}

impl ReconnectOptions {
    /// Create new reconnect options with defaults (unlimited, immediate).
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlimited attempts with exponential backoff starting at one second.
    pub fn backoff() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            use_exponential_backoff: true,
            ..Default::default()
        }
    }

    /// Create options with a fixed delay (no backoff).
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            use_exponential_backoff: false,
            ..Default::default()
        }
    }

    /// Set maximum number of reconnection attempts.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set initial delay before first reconnection attempt.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay between attempts.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier for exponential backoff.
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable exponential backoff.
    #[must_use]
    pub fn exponential_backoff(mut self, enabled: bool) -> Self {
        self.use_exponential_backoff = enabled;
        self
    }

    /// Whether attempt number `attempt` (1-based) is allowed.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    /// Calculate the delay before a given attempt (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.initial_delay;
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `max_attempts` is not zero
    /// - `backoff_multiplier` is >= 1.0
    /// - `initial_delay` is > 0 when backoff is enabled
    /// - `max_delay` >= `initial_delay`
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == Some(0) {
            return Err(Error::invalid_config("max_attempts must be >= 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if self.use_exponential_backoff && self.initial_delay.is_zero() {
            return Err(Error::invalid_config(
                "initial_delay must be > 0 when exponential backoff is enabled",
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::invalid_config("max_delay must be >= initial_delay"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_options_default() {
        let opts = ReconnectOptions::default();
        assert!(opts.max_attempts.is_none());
        assert!(!opts.use_exponential_backoff);
        assert_eq!(opts.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(opts.delay_for_attempt(50), Duration::ZERO);
        assert!(opts.allows_attempt(u32::MAX));
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_attempt_cap() {
        let opts = ReconnectOptions::new().max_attempts(3);
        assert!(opts.allows_attempt(1));
        assert!(opts.allows_attempt(3));
        assert!(!opts.allows_attempt(4));
    }

    #[test]
    fn test_delay_calculation() {
        let opts = ReconnectOptions::backoff();
        assert_eq!(opts.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(opts.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(opts.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(opts.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let opts = ReconnectOptions::backoff().max_delay(Duration::from_secs(10));
        // 2^10 = 1024 seconds, but capped at 10
        assert_eq!(opts.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_delay() {
        let opts = ReconnectOptions::fixed_delay(Duration::from_secs(5));
        assert_eq!(opts.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(opts.delay_for_attempt(5), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(ReconnectOptions::new().max_attempts(0).validate().is_err());
        assert!(
            ReconnectOptions::backoff()
                .backoff_multiplier(0.5)
                .validate()
                .is_err()
        );
        assert!(
            ReconnectOptions::new()
                .exponential_backoff(true)
                .validate()
                .is_err()
        );
        assert!(
            ReconnectOptions::fixed_delay(Duration::from_secs(90))
                .validate()
                .is_err()
        );
    }
}
