//! Application Layer
//!
//! The retrying invoker: control flow around a caller-supplied operation.

/// Retry combinator with observer and cancellation support.
pub mod invoker;

pub use invoker::{Interrupted, RetryObserver, RetryingInvoker, retry_with_backoff};
