//! HTTP fetch errors.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Response;
use reqwest::header::RETRY_AFTER;
use thiserror::Error;

use crate::domain::retry::{Classify, FailureKind};

/// Errors from a retried HTTP fetch.
///
/// Each variant maps to exactly one [`FailureKind`], fixed at the point the
/// failure is observed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (DNS, refused, reset, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The transport timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} {status_text} from {url}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
        /// Final URL of the response.
        url: String,
        /// Response body, empty if unreadable.
        body: String,
        /// Parsed `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// The successful body could not be decoded.
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// The request could not be built (bad URL, bad header).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Map a transport error from `reqwest`.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Build an [`FetchError::Http`] from a non-success response, consuming its body.
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.text().await.unwrap_or_default();

        Self::Http {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            url,
            body,
            retry_after,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Http { status, .. } => FailureKind::HttpStatus(*status),
            Self::Decode(_) | Self::InvalidRequest(_) => FailureKind::Other,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date (RFC 7231).
///
/// Dates in the past yield a zero delay.
#[must_use]
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&Utc) - now;
    Some(wait.to_std().unwrap_or(Duration::ZERO))
}
