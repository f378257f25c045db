//! Cache error types

use thiserror::Error;

/// Errors that can occur during cache operations
///
/// Provider-layer operations return `ProviderResult<T>`. The manager folds
/// every per-operation error into `CacheResult.error`; only `initialize()`
/// and `connect()` surface these directly.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No cache backend is reachable
    #[error("No cache provider available")]
    ProviderUnavailable,

    /// Failed to connect or reconnect to the remote backend
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Failed to serialize or deserialize a cache value
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Cache operation or health probe exceeded its configured timeout
    #[error("Cache operation timed out: {0}")]
    Timeout(String),

    /// Malformed key or pattern
    #[error("Cache validation error: {0}")]
    Validation(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Whether this error indicates the remote backend is unreachable
    ///
    /// Connection-class errors feed the orchestrator's failover machinery;
    /// serialization and validation errors do not.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            CacheError::Connection(_) | CacheError::ProviderUnavailable | CacheError::Timeout(_)
        )
    }
}

/// Result type for provider-layer cache operations
pub type ProviderResult<T> = Result<T, CacheError>;
