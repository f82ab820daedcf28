#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::items_after_statements
    )
)]

//! Market Fetch - Retrying Invoker
//!
//! Wraps market-data calls (quote providers, backend APIs) with bounded
//! exponential backoff and explicit failure classification.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Retry policy with no I/O
//!   - `retry`: `RetryConfig`, backoff arithmetic, `FailureKind` classifier
//!
//! - **Application**: Control flow
//!   - `invoker`: `RetryingInvoker`, observer hook, cancellation
//!
//! - **Infrastructure**: Adapters and ambient concerns
//!   - `http`: `reqwest` client wrapper and `FetchError`
//!   - `config`: environment-driven `FetchConfig`
//!   - `telemetry`: tracing subscriber and OTLP export
//!   - `metrics`: retry counters and backoff histogram
//!
//! # Flow
//!
//! ```text
//! caller ──► RetryingInvoker ──► operation() ──► Ok ──► caller
//!                 ▲                   │
//!                 │                   ▼ Err
//!              sleep ◄── retryable? ──┴── no / exhausted ──► Err to caller
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Retry policy types with no external dependencies.
pub mod domain;

/// Application layer - The retrying invoker.
pub mod application;

/// Infrastructure layer - HTTP, configuration, telemetry and metrics.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Retry policy
pub use domain::retry::{
    Classify, DEFAULT_RETRYABLE_STATUS_CODES, FailureKind, RetryConfig, RetryConfigError,
};

// Invoker
pub use application::{Interrupted, RetryObserver, RetryingInvoker, retry_with_backoff};

// HTTP
pub use infrastructure::http::{FetchError, RetryingHttpClient, parse_retry_after};

// Configuration
pub use infrastructure::config::{ConfigError, FetchConfig};

// Metrics
pub use infrastructure::metrics::{FailureOutcome, get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

// Cancellation token accepted by the cancellable invoke paths.
pub use tokio_util::sync::CancellationToken;
