//! HTTP Adapter
//!
//! `reqwest`-backed fetches retried through the invoker.

mod client;
mod error;

pub use client::RetryingHttpClient;
pub use error::{FetchError, parse_retry_after};
