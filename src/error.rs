//! Error types for creditfarm
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in creditfarm
#[derive(Debug, Error)]
pub enum FarmError {
    /// Account missing from the account store
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Transport-level HTTP failure (timeout, DNS, connection)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for creditfarm operations
pub type Result<T> = std::result::Result<T, FarmError>;
