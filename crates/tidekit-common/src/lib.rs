//! # Tidekit Common
//!
//! Shared error types, logging configuration, and retry utilities for the
//! tidekit offline caching engine.
//!
//! ## Features
//!
//! - Unified error type with per-category constructors
//! - Logging configuration and setup
//! - Retry with exponential backoff

use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, RetryConfig};

/// Unified error type for tidekit.
#[derive(Error, Debug)]
pub enum TidekitError {
    /// Cache storage errors.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Network-level errors (connection, DNS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// Precache installation errors.
    #[error("Install error: {0}")]
    Install(String),

    /// Activation errors.
    #[error("Activation error: {0}")]
    Activation(String),

    /// Configuration errors.
    #[error("Config error: {0}")]
    Config(String),
}

impl TidekitError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create an install error.
    pub fn install(message: impl Into<String>) -> Self {
        Self::Install(message.into())
    }

    /// Create an activation error.
    pub fn activation(message: impl Into<String>) -> Self {
        Self::Activation(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TidekitError::Network(_) | TidekitError::Install(_))
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            TidekitError::Cache(_) => "cache",
            TidekitError::Network(_) => "network",
            TidekitError::Install(_) => "install",
            TidekitError::Activation(_) => "activation",
            TidekitError::Config(_) => "config",
        }
    }
}

/// Result type alias for tidekit operations.
pub type Result<T> = std::result::Result<T, TidekitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(TidekitError::cache("test").category(), "cache");
        assert_eq!(TidekitError::install("test").category(), "install");
        assert_eq!(TidekitError::activation("test").category(), "activation");
    }

    #[test]
    fn test_retryable() {
        assert!(TidekitError::network("test").is_retryable());
        assert!(TidekitError::install("test").is_retryable());
        assert!(!TidekitError::cache("test").is_retryable());
        assert!(!TidekitError::config("test").is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = TidekitError::install("manifest fetch for '/style.css' returned 404");
        assert_eq!(
            err.to_string(),
            "Install error: manifest fetch for '/style.css' returned 404"
        );
    }
}
