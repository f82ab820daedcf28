//! Retrying Invoker
//!
//! Wraps a zero-argument async operation with bounded exponential backoff.
//!
//! Each invocation runs its attempts strictly in order and owns its own
//! attempt counter, so a single [`RetryingInvoker`] can be shared freely
//! between tasks. The only suspension points are the operation itself and
//! the backoff sleep between attempts.
//!
//! # Example
//!
//! ```rust,ignore
//! use market_fetch::{FailureKind, RetryConfig, RetryingInvoker};
//!
//! let invoker = RetryingInvoker::<FetchError>::new(RetryConfig::default())?
//!     .on_retry(|attempt, error| eprintln!("retry #{attempt}: {error}"));
//!
//! let quote = invoker.invoke(|| fetch_quote("RELIANCE.NS")).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::retry::{Classify, RetryConfig, RetryConfigError};
use crate::infrastructure::metrics::{self, FailureOutcome};

/// Callback invoked before each retry delay with the 1-based retry number
/// and the error that triggered it. It runs synchronously and must not panic.
pub type RetryObserver<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Outcome of a cancellable invocation that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum Interrupted<E> {
    /// The cancellation token fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation failed and was not retried further.
    #[error("{0}")]
    Failed(E),
}

impl<E> Interrupted<E> {
    /// True when the invocation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The operation's own error, if the invocation was not cancelled.
    #[must_use]
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Retry combinator for async operations failing with a classifiable error.
pub struct RetryingInvoker<E> {
    config: RetryConfig,
    observer: Option<RetryObserver<E>>,
}

impl<E> RetryingInvoker<E> {
    /// Create an invoker after validating the configuration.
    pub fn new(config: RetryConfig) -> Result<Self, RetryConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            observer: None,
        })
    }

    /// Attach a retry observer, replacing any previous one.
    #[must_use]
    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &E) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The configuration this invoker applies.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl<E> Default for RetryingInvoker<E> {
    fn default() -> Self {
        Self {
            config: RetryConfig::default(),
            observer: None,
        }
    }
}

impl<E> Clone for RetryingInvoker<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryingInvoker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingInvoker")
            .field("config", &self.config)
            .field("observer", &self.observer.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl<E> RetryingInvoker<E>
where
    E: Classify + fmt::Display,
{
    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or exhausts `max_retries`.
    ///
    /// The returned error is exactly the one produced by the last attempt.
    pub async fn invoke<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            metrics::record_attempt();

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let Some(delay) = self.schedule_retry(attempt, &error) else {
                        return Err(error);
                    };
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`invoke`](Self::invoke), but `token` interrupts both an in-flight
    /// attempt and a pending backoff delay.
    pub async fn invoke_until_cancelled<T, F, Fut>(
        &self,
        mut operation: F,
        token: &CancellationToken,
    ) -> Result<T, Interrupted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;

        loop {
            if token.is_cancelled() {
                return Err(cancelled(attempt));
            }

            metrics::record_attempt();

            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => return Err(cancelled(attempt)),
                outcome = operation() => outcome,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let Some(delay) = self.schedule_retry(attempt, &error) else {
                        return Err(Interrupted::Failed(error));
                    };
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Err(cancelled(attempt)),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Classify a failed attempt and return the delay before the next one,
    /// or `None` when the error must propagate.
    fn schedule_retry(&self, attempt: u32, error: &E) -> Option<Duration> {
        let kind = error.failure_kind();

        if !self.config.is_retryable(kind) {
            tracing::debug!(
                attempt = attempt + 1,
                kind = %kind,
                error = %error,
                "Non-retryable failure"
            );
            metrics::record_failure(kind, FailureOutcome::NonRetryable);
            return None;
        }

        if attempt >= self.config.max_retries {
            tracing::warn!(
                attempts = attempt + 1,
                kind = %kind,
                error = %error,
                "Retries exhausted"
            );
            metrics::record_failure(kind, FailureOutcome::Exhausted);
            return None;
        }

        let delay = self.config.backoff_delay(attempt, error.retry_after());

        if let Some(observer) = &self.observer {
            observer(attempt + 1, error);
        }

        tracing::warn!(
            attempt = attempt + 1,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis(),
            kind = %kind,
            error = %error,
            "Transient failure, retrying"
        );
        metrics::record_retry(kind, delay);

        Some(delay)
    }
}

fn cancelled<E>(attempt: u32) -> Interrupted<E> {
    tracing::debug!(attempt = attempt + 1, "Invocation cancelled");
    metrics::record_cancelled();
    Interrupted::Cancelled
}

/// Run `operation` with `config` and no observer.
///
/// The configuration is used as given; call [`RetryConfig::validate`] first
/// for untrusted input.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    E: Classify + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let invoker = RetryingInvoker {
        config: config.clone(),
        observer: None,
    };
    invoker.invoke(operation).await
}
