//! Failure classification.
//!
//! Every error that flows through the invoker is reduced once, at the point
//! the failure is first observed, to a [`FailureKind`]. Retry decisions are
//! made on the kind alone, never by probing the error's message.
//!
//! | Kind | Retryable? |
//! |------|------------|
//! | `Network` | Always |
//! | `Timeout` | Always (covers connection aborts) |
//! | `HttpStatus(4xx)` | Only if listed in the retryable set |
//! | `HttpStatus(other)` | Only if listed in the retryable set |
//! | `Other` | Never |

use std::fmt;
use std::time::Duration;

/// What went wrong during a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The transport itself failed before a response arrived
    /// (DNS, connection refused, reset, TLS).
    Network,
    /// A response arrived with a non-success status code.
    HttpStatus(u16),
    /// The request timed out or the connection was aborted.
    Timeout,
    /// Anything else: invalid request, decode failure, application error.
    Other,
}

impl FailureKind {
    /// Returns the HTTP status carried by this failure, if any.
    #[must_use]
    pub const fn status(self) -> Option<u16> {
        match self {
            Self::HttpStatus(status) => Some(status),
            _ => None,
        }
    }

    /// True when the status is a client error (`400..500`).
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        matches!(self, Self::HttpStatus(400..=499))
    }

    /// Short label used for metrics and structured logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::HttpStatus(_) => "http_status",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpStatus(status) => write!(f, "http_status({status})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors that can describe themselves to the retry classifier.
///
/// Implement this for any error type passed through
/// [`RetryingInvoker`](crate::RetryingInvoker).
pub trait Classify {
    /// The failure kind of this error.
    fn failure_kind(&self) -> FailureKind;

    /// Server-provided delay hint (e.g. an HTTP `Retry-After` header).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Classify for FailureKind {
    fn failure_kind(&self) -> FailureKind {
        *self
    }
}
