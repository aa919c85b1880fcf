//! Invalidation events exchanged between processes

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic prefix under which a cache's invalidations are published
pub const TOPIC_PREFIX: &str = "cache-invalidation:";

/// Topic carrying invalidations for `cache_name`
pub fn topic_for(cache_name: &str) -> String {
    format!("{}{}", TOPIC_PREFIX, cache_name)
}

/// Mutation that produced an invalidation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    /// A new value was written
    Updated,

    /// One key was cleared
    Cleared,

    /// The whole cache was cleared
    ClearedAll,
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Updated => write!(f, "value updated"),
            InvalidationReason::Cleared => write!(f, "key cleared"),
            InvalidationReason::ClearedAll => write!(f, "cache cleared"),
        }
    }
}

/// "This key (or this whole cache) changed" notice
///
/// `key == None` means every key of `cache_name`. Events are ephemeral: they
/// are neither persisted nor retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub cache_name: String,

    #[serde(default)]
    pub key: Option<CacheKey>,

    pub reason: InvalidationReason,

    /// Identifier of the publishing process instance
    pub origin: Uuid,

    pub timestamp: DateTime<Utc>,
}

impl InvalidationEvent {
    /// Event for a single key
    pub fn for_key(
        cache_name: impl Into<String>,
        key: impl Into<CacheKey>,
        reason: InvalidationReason,
        origin: Uuid,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            key: Some(key.into()),
            reason,
            origin,
            timestamp: Utc::now(),
        }
    }

    /// Event covering every key of the cache
    pub fn for_all(cache_name: impl Into<String>, origin: Uuid) -> Self {
        Self {
            cache_name: cache_name.into(),
            key: None,
            reason: InvalidationReason::ClearedAll,
            origin,
            timestamp: Utc::now(),
        }
    }

    pub fn is_clear_all(&self) -> bool {
        self.key.is_none()
    }
}
