//! Error types for quota operations.
//!
//! This module provides the error hierarchy for every limiter operation:
//! quota exhaustion, store failures, configuration errors and connection errors.
//! A transport layer only needs [`RateLimitError::is_quota_exhausted`] to tell a
//! "too many requests" answer apart from an internal failure.

use std::time::Duration;
use thiserror::Error;

/// Result type for quota operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for quota operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The current window does not hold enough quota for the request.
    #[error("Quota exhausted: requested {requested}, remaining {remaining} of {limit}")]
    QuotaExhausted {
        /// Units asked for.
        requested: u64,
        /// Units left in the current window.
        remaining: u64,
        /// Maximum units per window.
        limit: u64,
        /// Time until the current window expires.
        retry_after: Option<Duration>,
    },

    /// The request itself is malformed (e.g. zero units).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The configured driver name is not recognised or not compiled in.
    #[error("Unsupported driver [{0}]")]
    UnsupportedDriver(String),

    /// Every optimistic commit attempt hit a concurrent modification.
    #[error("Backend contention exhausted after {attempts} attempts")]
    ContentionExhausted {
        /// Number of commit attempts made.
        attempts: u32,
    },

    /// Counter store error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection error (e.g., Redis connection failed).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl RateLimitError {
    /// Whether the caller simply ran out of quota for the current window.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }

    /// Whether the counter store could not be reached or did not answer in time.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Storage(StorageError::OperationFailed(_) | StorageError::PoolExhausted)
        )
    }
}

/// Counter store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A store command failed.
    #[error("{0}")]
    OperationFailed(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No pooled connection became free in time.
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl StorageError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid quota configuration.
    #[error("Invalid quota: {0}")]
    InvalidQuota(String),

    /// Invalid store configuration.
    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Settings could not be read or deserialized.
    #[error("Failed to load settings: {0}")]
    Load(String),

    /// Logging could not be initialised.
    #[error("Invalid logger configuration: {0}")]
    Logger(String),
}

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to connect.
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Connection timeout.
    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    /// The store has not been configured with a connection yet.
    #[error("Backend not configured")]
    NotConfigured,
}
