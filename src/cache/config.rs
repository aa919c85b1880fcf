//! Configuration for the in-process tier and for layered caches

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`MemoryCache`](crate::cache::MemoryCache)
///
/// Missing fields fall back to [`CacheConfig::default`] when deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default time-to-live for cache entries
    pub default_ttl: Duration,

    /// Maximum number of entries in the cache
    pub max_entries: usize,

    /// Maximum total size of cached data in bytes
    pub max_size_bytes: usize,

    /// TTL jitter factor (0.0 - 1.0)
    /// Spreads expirations so entries written together do not expire together
    pub ttl_jitter: f64,

    /// Enable automatic cleanup of expired entries
    pub enable_auto_cleanup: bool,

    /// Interval for automatic cleanup checks
    pub cleanup_interval: Duration,

    /// Enable LRU eviction policy
    /// When false, inserts into a full cache fail instead of evicting
    pub enable_lru_eviction: bool,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            // 100 MB default
            max_size_bytes: 100 * 1024 * 1024,
            ttl_jitter: 0.125,
            enable_auto_cleanup: true,
            cleanup_interval: Duration::from_secs(300),
            enable_lru_eviction: true,
            enable_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Reject limits a memory tier cannot operate with
    pub fn validate(&self) -> Result<()> {
        let problem = if self.max_entries == 0 {
            Some("max_entries must be greater than 0")
        } else if self.max_size_bytes == 0 {
            Some("max_size_bytes must be greater than 0")
        } else if !(0.0..=1.0).contains(&self.ttl_jitter) {
            Some("ttl_jitter must be between 0.0 and 1.0")
        } else if self.default_ttl.is_zero() {
            Some("default_ttl must be greater than 0")
        } else {
            None
        };

        match problem {
            Some(problem) => Err(CacheError::Configuration(problem.to_string())),
            None => Ok(()),
        }
    }

    /// Calculate actual TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Duration::from_secs_f64(final_secs)
    }
}

/// Fluent construction of a [`CacheConfig`], starting from the defaults
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = max;
        self
    }

    pub fn max_size_bytes(mut self, size: usize) -> Self {
        self.config.max_size_bytes = size;
        self
    }

    /// Fraction of the TTL (0.0 - 1.0) randomly added or removed per entry
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.config.ttl_jitter = jitter;
        self
    }

    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.config.enable_auto_cleanup = enable;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    pub fn enable_lru_eviction(mut self, enable: bool) -> Self {
        self.config.enable_lru_eviction = enable;
        self
    }

    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.config.enable_metrics = enable;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

impl CacheConfig {
    /// Short-lived local tier in front of a shared tier
    pub fn near_cache() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 5_000,
            max_size_bytes: 50 * 1024 * 1024,
            ttl_jitter: 0.15,
            ..Default::default()
        }
    }
}

/// Names the two tiers of a layered cache and its invalidation provider
///
/// Tier names are registry lookups, so either may be a wildcard-covered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredCachePolicy {
    /// Fast, process-local tier
    pub tier1: String,

    /// Authoritative, shared tier
    pub tier2: String,

    /// Name of the notification provider used for cross-process invalidation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_provider: Option<String>,
}

impl LayeredCachePolicy {
    pub fn new(tier1: impl Into<String>, tier2: impl Into<String>) -> Self {
        Self {
            tier1: tier1.into(),
            tier2: tier2.into(),
            sync_provider: None,
        }
    }

    /// Attach a notification provider by name
    pub fn with_sync_provider(mut self, provider: impl Into<String>) -> Self {
        self.sync_provider = Some(provider.into());
        self
    }
}
