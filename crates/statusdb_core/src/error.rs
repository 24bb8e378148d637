//! Error types for the correlation engine.

use statusdb_store::StoreError;
use thiserror::Error;

/// Result alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the correlation engine and its services.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An indexed-store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A status label or ordinal could not be parsed.
    #[error("invalid status: {value}")]
    InvalidStatus {
        /// The rejected input.
        value: String,
    },

    /// The engine configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        message: String,
    },
}

impl CoreError {
    /// Creates an [`CoreError::InvalidStatus`] error.
    pub fn invalid_status(value: impl Into<String>) -> Self {
        Self::InvalidStatus {
            value: value.into(),
        }
    }

    /// Creates an [`CoreError::InvalidConfig`] error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
