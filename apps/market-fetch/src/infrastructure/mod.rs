//! Infrastructure Layer - Adapters and external integrations.

/// Environment configuration.
pub mod config;

/// Retrying HTTP client.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
