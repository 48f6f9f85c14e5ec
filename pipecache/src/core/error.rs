use thiserror::Error;

/// Main error type for cache operations.
///
/// `Clone` is required because a coalesced fetch delivers the same
/// error to every waiter.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("remote service unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("optional dependency missing: {0}")]
    DependencyMissing(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("fetch coalescing failed for key: {0}")]
    Coalescing(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
