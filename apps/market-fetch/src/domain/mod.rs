//! Domain Layer
//!
//! Pure retry policy types with no runtime or transport dependencies.

/// Retry configuration, backoff calculation and failure classification.
pub mod retry;
