//! Server error types

use thiserror::Error;

/// Errors that can occur in the cohort server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read the configuration file
    #[error("failed to read config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file did not parse
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] cohort_core::storage::Error),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}
