//! Retry configuration, backoff calculation and the retry classifier.
//!
//! # Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | `max_retries` | 3 |
//! | `initial_delay` | 1s |
//! | `max_delay` | 10s |
//! | `backoff_multiplier` | 2.0 |
//! | `retryable_status_codes` | 408, 429, 500, 502, 503, 504 |
//! | `jitter_factor` | 0.0 (disabled) |
//! | `respect_retry_after` | false |
//!
//! Supplying `retryable_status_codes` replaces the default set entirely;
//! codes are never merged with the defaults.

use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classify::FailureKind;

/// HTTP status codes retried when the caller does not supply its own set.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [
    408, // Request Timeout
    429, // Too Many Requests
    500, // Internal Server Error
    502, // Bad Gateway
    503, // Service Unavailable
    504, // Gateway Timeout
];

/// Invalid retry configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryConfigError {
    /// Initial delay must be positive.
    #[error("initial delay must be greater than zero")]
    ZeroInitialDelay,

    /// Maximum delay is smaller than the initial delay.
    #[error("max delay ({max_ms}ms) must be >= initial delay ({initial_ms}ms)")]
    MaxDelayBelowInitial {
        /// Configured initial delay in milliseconds.
        initial_ms: u128,
        /// Configured maximum delay in milliseconds.
        max_ms: u128,
    },

    /// Multiplier must be a finite number greater than one.
    #[error("backoff multiplier must be > 1.0, got {0}")]
    InvalidMultiplier(f64),

    /// Jitter must lie in `[0.0, 1.0]`.
    #[error("jitter factor must be within [0.0, 1.0], got {0}")]
    InvalidJitter(f64),
}

/// Retry behavior for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 means a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,
    /// Status codes treated as transient.
    pub retryable_status_codes: BTreeSet<u16>,
    /// Randomization applied to each delay (0.2 = ±20%).
    pub jitter_factor: f64,
    /// Prefer a server `Retry-After` hint over the computed delay.
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            jitter_factor: 0.0,
            respect_retry_after: false,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with custom backoff settings and the default status codes.
    #[must_use]
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// A configuration that makes exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Replace the retryable status codes.
    #[must_use]
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Set the jitter factor.
    #[must_use]
    pub const fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Honor server `Retry-After` hints.
    #[must_use]
    pub const fn with_respect_retry_after(mut self, respect: bool) -> Self {
        self.respect_retry_after = respect;
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.initial_delay.is_zero() {
            return Err(RetryConfigError::ZeroInitialDelay);
        }
        if self.max_delay < self.initial_delay {
            return Err(RetryConfigError::MaxDelayBelowInitial {
                initial_ms: self.initial_delay.as_millis(),
                max_ms: self.max_delay.as_millis(),
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(RetryConfigError::InvalidMultiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(RetryConfigError::InvalidJitter(self.jitter_factor));
        }
        Ok(())
    }

    /// Total number of times the operation may run.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before the retry that follows `attempt` (0-indexed), without jitter.
    ///
    /// `min(initial_delay * backoff_multiplier ^ attempt, max_delay)`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Delay actually slept after a failed `attempt`.
    ///
    /// A server hint wins when `respect_retry_after` is set; otherwise the
    /// computed backoff is used with jitter applied. Both are capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if self.respect_retry_after {
            if let Some(hint) = retry_after {
                return hint.min(self.max_delay);
            }
        }
        self.apply_jitter(self.delay_for_attempt(attempt))
    }

    /// Decide whether a failure of this kind is worth another attempt.
    ///
    /// A 4xx status outside the retryable set fails fast. Network failures
    /// and timeouts always retry. Any other status retries only when listed.
    #[must_use]
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::HttpStatus(status) if kind.is_client_error() => {
                self.retryable_status_codes.contains(&status)
            }
            FailureKind::Network | FailureKind::Timeout => true,
            FailureKind::HttpStatus(status) => self.retryable_status_codes.contains(&status),
            FailureKind::Other => false,
        }
    }

    /// Full jitter within `delay * (1 ± jitter_factor)`, capped at `max_delay`.
    fn apply_jitter(&self, delay: Duration) -> Duration {
        // Unvalidated configs may carry NaN or out-of-range factors.
        if !self.jitter_factor.is_finite() || self.jitter_factor <= 0.0 {
            return delay;
        }

        let base_ms = delay.as_millis() as f64;
        let range = base_ms * self.jitter_factor.min(1.0);
        let min = (base_ms - range).max(0.0);
        let max = base_ms + range;
        let jittered = rand::rng().random_range(min..=max);

        Duration::from_millis(jittered as u64).min(self.max_delay)
    }
}
