//! Configuration Module
//!
//! Environment-driven configuration for the retrying HTTP client.

mod settings;

pub use settings::{ConfigError, FetchConfig};
