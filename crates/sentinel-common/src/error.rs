//! Error types and result handling for the Sentinel monitoring pipeline

use thiserror::Error;

/// Result type alias for Sentinel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sentinel operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    /// Get error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Network(_) => "network",
            Error::Timeout(_) => "timeout",
            Error::Database(_) => "database",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
            Error::Generic(_) => "generic",
        }
    }
}
