//! Retry Policy
//!
//! Configuration, backoff arithmetic and failure classification used by the
//! retrying invoker. Nothing here performs I/O or sleeps.

mod classify;
mod config;

pub use classify::{Classify, FailureKind};
pub use config::{DEFAULT_RETRYABLE_STATUS_CODES, RetryConfig, RetryConfigError};
