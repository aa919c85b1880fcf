//! Error types for cache operations
//!
//! Construction-time failures (`Configuration`, `Synchronization`) are fatal to
//! the constructor that raised them. Everything else is surfaced per call.

use std::sync::Arc;
use thiserror::Error;

/// Main error type for cache operations
///
/// Cloneable so a single failed computation can be handed to every caller
/// waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Empty or malformed cache name, pattern or key
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing tier, duplicate tier identity or self-referential layering
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Typed resolution found a cache of another concrete type
    #[error("Cache '{name}' is not of type {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Invalidation subscription or publication failed
    #[error("Synchronization error: {0}")]
    Synchronization(String),

    /// The get-or-create producer failed or panicked; the failure is never cached
    #[error("Producer failed: {0}")]
    ProducerFailure(String),

    /// Transient failure reported by a storage tier
    #[error("Backend error: {0}")]
    Backend(String),

    /// Entry does not fit in a size-bounded tier
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization(Arc::new(error))
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
