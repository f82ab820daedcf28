//! Fetch Configuration Settings
//!
//! Configuration for the retrying HTTP client, loaded from environment
//! variables. Nothing is read until [`FetchConfig::from_env`] (or
//! [`FetchConfig::load`]) is called.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::retry::{RetryConfig, RetryConfigError};

/// Default transport timeout per attempt.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable names.
mod keys {
    pub const MAX_RETRIES: &str = "MARKET_FETCH_MAX_RETRIES";
    pub const INITIAL_DELAY_MS: &str = "MARKET_FETCH_INITIAL_DELAY_MS";
    pub const MAX_DELAY_MS: &str = "MARKET_FETCH_MAX_DELAY_MS";
    pub const BACKOFF_MULTIPLIER: &str = "MARKET_FETCH_BACKOFF_MULTIPLIER";
    pub const RETRYABLE_STATUS_CODES: &str = "MARKET_FETCH_RETRYABLE_STATUS_CODES";
    pub const JITTER_FACTOR: &str = "MARKET_FETCH_JITTER_FACTOR";
    pub const RESPECT_RETRY_AFTER: &str = "MARKET_FETCH_RESPECT_RETRY_AFTER";
    pub const REQUEST_TIMEOUT_MS: &str = "MARKET_FETCH_REQUEST_TIMEOUT_MS";
    pub const USER_AGENT: &str = "MARKET_FETCH_USER_AGENT";
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value found.
        value: String,
        /// What the variable should contain.
        expected: &'static str,
    },

    /// The resulting retry configuration violates an invariant.
    #[error("invalid retry configuration: {0}")]
    InvalidRetry(#[from] RetryConfigError),

    /// A zero per-attempt timeout would fail every request.
    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Complete fetch configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Retry behavior applied to every request.
    pub retry: RetryConfig,
    /// Transport timeout per attempt.
    pub request_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Create configuration from process environment variables.
    ///
    /// Unset variables keep their defaults; set but malformed ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_env()
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryConfig::default();

        let retry = RetryConfig {
            max_retries: parse_var(&lookup, keys::MAX_RETRIES, defaults.max_retries)?,
            initial_delay: parse_millis(&lookup, keys::INITIAL_DELAY_MS, defaults.initial_delay)?,
            max_delay: parse_millis(&lookup, keys::MAX_DELAY_MS, defaults.max_delay)?,
            backoff_multiplier: parse_var(
                &lookup,
                keys::BACKOFF_MULTIPLIER,
                defaults.backoff_multiplier,
            )?,
            retryable_status_codes: parse_status_codes(
                &lookup,
                keys::RETRYABLE_STATUS_CODES,
                defaults.retryable_status_codes,
            )?,
            jitter_factor: parse_var(&lookup, keys::JITTER_FACTOR, defaults.jitter_factor)?,
            respect_retry_after: parse_bool(
                &lookup,
                keys::RESPECT_RETRY_AFTER,
                defaults.respect_retry_after,
            )?,
        };

        let request_timeout =
            parse_millis(&lookup, keys::REQUEST_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT)?;
        let user_agent = lookup(keys::USER_AGENT)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_user_agent);

        let config = Self {
            retry,
            request_timeout,
            user_agent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the retry invariants and that the request timeout is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn default_user_agent() -> String {
    format!("market-fetch/{}", env!("CARGO_PKG_VERSION"))
}

fn invalid(key: &str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value,
        expected,
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(key, raw, "a number")),
    }
}

fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| invalid(key, raw, "milliseconds")),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "a boolean")),
    }
}

fn parse_status_codes<F>(
    lookup: &F,
    key: &str,
    default: BTreeSet<u16>,
) -> Result<BTreeSet<u16>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| code.parse::<u16>())
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|_| invalid(key, raw.clone(), "comma-separated status codes"))
}
