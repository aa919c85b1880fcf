//! Stored entries of the in-process tier

use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A value held by the in-process tier, with expiry and access metadata
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub key: CacheKey,
    pub value: CacheValue,
    pub metadata: EntryMetadata,
}

impl StoredEntry {
    /// Create a new entry expiring `ttl` from now
    pub fn new(key: CacheKey, value: CacheValue, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(3600));

        let mut entry = Self {
            key,
            value,
            metadata: EntryMetadata {
                created_at: now,
                accessed_at: now,
                expires_at,
                access_count: 0,
                size_bytes: 0,
            },
        };
        entry.metadata.size_bytes = entry.calculate_size();
        entry
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.metadata.expires_at
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now();
        if now > self.metadata.expires_at {
            None
        } else {
            (self.metadata.expires_at - now).to_std().ok()
        }
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.metadata.accessed_at = Utc::now();
        self.metadata.access_count += 1;
    }

    /// Approximate size: key + serialized value + metadata overhead
    pub fn calculate_size(&self) -> usize {
        self.key.len() + self.value.to_string().len() + std::mem::size_of::<EntryMetadata>()
    }
}

/// Metadata associated with a stored entry
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub created_at: DateTime<Utc>,

    /// Last access time (for LRU tracking)
    pub accessed_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    pub access_count: u64,

    pub size_bytes: usize,
}
