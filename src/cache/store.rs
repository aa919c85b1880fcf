//! In-process cache tier with TTL, LRU eviction and single-flight computation

use crate::cache::{
    config::CacheConfig,
    entry::StoredEntry,
    types::{CacheKey, CacheStats, CacheValue},
    validate_key, Cache, Producer,
};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A computation shared by every caller waiting on the same key
type SharedComputation = Shared<BoxFuture<'static, Result<CacheValue>>>;

/// In-memory cache tier
///
/// This implementation provides:
/// - Thread-safe async access via RwLock
/// - Automatic TTL-based expiration
/// - LRU eviction when size limits are reached
/// - Per-key single-flight `get_or_create`
/// - Hit/miss/eviction statistics
pub struct MemoryCache {
    name: String,

    pub(crate) config: CacheConfig,

    store: Arc<RwLock<CacheStore>>,

    /// Computations currently running, by key
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedComputation>>>,
}

/// Internal cache storage
struct CacheStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, StoredEntry>,

    /// LRU tracking: maintains access order
    lru_queue: VecDeque<CacheKey>,

    stats: CacheStats,

    /// Total size of cached data in bytes
    current_size_bytes: usize,
}

impl MemoryCache {
    /// Create a new cache with the given configuration
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let name = name.into();
        info!(cache = %name, "Initializing memory cache with config: {:?}", config);

        let store = CacheStore {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            stats: CacheStats::default(),
            current_size_bytes: 0,
        };

        Self {
            name,
            config,
            store: Arc::new(RwLock::new(store)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a cache with the default configuration
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Check if a key exists in the cache (without updating access time)
    pub async fn contains_key(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Remove all expired entries, returning the removed keys
    pub async fn cleanup_expired(&self) -> Vec<CacheKey> {
        let mut store = self.store.write().await;

        let expired_keys: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        if !expired_keys.is_empty() {
            for key in &expired_keys {
                store.remove_entry(key);
            }
            store.stats.evictions_ttl += expired_keys.len() as u64;
            debug!(cache = %self.name, "Cleaned up {} expired entries", expired_keys.len());
        }

        expired_keys
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let store = self.store.read().await;
        store.stats.clone()
    }

    /// Get current cache size in bytes
    pub async fn size_bytes(&self) -> usize {
        let store = self.store.read().await;
        store.current_size_bytes
    }

    /// Get number of entries in cache
    pub async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    /// Check if cache is empty
    pub async fn is_empty(&self) -> bool {
        let store = self.store.read().await;
        store.entries.is_empty()
    }

    /// Number of keys with a computation in flight
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn lookup(&self, key: &str, record: bool) -> Option<CacheValue> {
        let mut store = self.store.write().await;
        let value = store.lookup(key, self.config.enable_lru_eviction);

        if record {
            if value.is_some() {
                store.stats.hits += 1;
                debug!(cache = %self.name, key = %key, "Cache hit");
            } else {
                store.stats.misses += 1;
                debug!(cache = %self.name, key = %key, "Cache miss");
            }
        }

        value
    }

    /// Build the shared computation for `key`. The future stores a successful
    /// result before releasing the in-flight slot, so a caller that finds no
    /// slot will find the value. The slot is released on every outcome,
    /// including a panicking producer.
    fn computation(&self, key: CacheKey, producer: Producer) -> SharedComputation {
        let name = self.name.clone();
        let config = self.config.clone();
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            debug!(cache = %name, key = %key, "Running producer");
            let outcome = match AssertUnwindSafe(producer).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(CacheError::ProducerFailure(panic_message(panic.as_ref()))),
            };

            let result = {
                let mut guard = store.write().await;
                guard.stats.computations += 1;

                match outcome {
                    Ok(value) => {
                        if let Err(e) = guard.insert(&config, key.clone(), value.clone()) {
                            warn!(cache = %name, key = %key, "Computed value not cached: {}", e);
                        }
                        guard.update_stats(&config);
                        Ok(value)
                    }
                    Err(e) => {
                        warn!(cache = %name, key = %key, "Producer failed: {}", e);
                        Err(e)
                    }
                }
            };

            in_flight.lock().await.remove(&key);
            result
        }
        .boxed()
        .shared()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("producer panicked: {}", detail)
}

impl CacheStore {
    fn lookup(&mut self, key: &str, track_lru: bool) -> Option<CacheValue> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };

        if expired {
            debug!(key = %key, "Cache entry expired");
            self.stats.evictions_ttl += 1;
            self.remove_entry(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.mark_accessed();
        let value = entry.value.clone();

        if track_lru {
            self.lru_queue.retain(|k| k != key);
            self.lru_queue.push_back(key.to_string());
        }

        Some(value)
    }

    fn insert(&mut self, config: &CacheConfig, key: CacheKey, value: CacheValue) -> Result<()> {
        let entry = StoredEntry::new(key.clone(), value, config.ttl_with_jitter());
        let size = entry.metadata.size_bytes;

        // A replaced entry frees its own space first
        self.remove_entry(&key);
        self.evict_if_needed(config, size)?;

        self.entries.insert(key.clone(), entry);
        self.lru_queue.push_back(key);
        self.current_size_bytes += size;
        self.stats.entries = self.entries.len();

        Ok(())
    }

    fn remove_entry(&mut self, key: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.current_size_bytes = self
            .current_size_bytes
            .saturating_sub(entry.metadata.size_bytes);
        self.stats.entries = self.entries.len();
        Some(entry)
    }

    /// Evict entries if needed to make room for a new entry
    fn evict_if_needed(&mut self, config: &CacheConfig, needed_size: usize) -> Result<()> {
        if needed_size > config.max_size_bytes {
            return Err(CacheError::CapacityExceeded(format!(
                "entry of {} bytes exceeds max_size_bytes {}",
                needed_size, config.max_size_bytes
            )));
        }

        let full = |store: &CacheStore| {
            store.entries.len() >= config.max_entries
                || store.current_size_bytes + needed_size > config.max_size_bytes
        };

        if !config.enable_lru_eviction {
            if full(self) {
                return Err(CacheError::CapacityExceeded(
                    "cache is full and LRU eviction is disabled".to_string(),
                ));
            }
            return Ok(());
        }

        while full(self) {
            match self.lru_queue.pop_front() {
                Some(key) => {
                    debug!(key = %key, "Evicting least recently used entry");
                    self.remove_entry(&key);
                    self.stats.evictions_size += 1;
                }
                None => {
                    warn!("Cannot evict more entries, cache size limit exceeded");
                    return Err(CacheError::CapacityExceeded(
                        "cache size limit exceeded".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    fn update_stats(&mut self, config: &CacheConfig) {
        if config.enable_metrics {
            self.stats.size_bytes = self.current_size_bytes;
            self.stats.entries = self.entries.len();
            self.stats.avg_entry_size = if self.entries.is_empty() {
                0
            } else {
                self.current_size_bytes / self.entries.len()
            };
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;
        Ok(self.lookup(key, true).await)
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
        validate_key(key)?;
        let mut store = self.store.write().await;

        debug!(cache = %self.name, key = %key, "Storing cache entry");
        store.insert(&self.config, key.to_string(), value)?;
        store.update_stats(&self.config);

        Ok(())
    }

    async fn get_or_create(&self, key: &str, producer: Producer) -> Result<CacheValue> {
        validate_key(key)?;

        if let Some(value) = self.lookup(key, true).await {
            return Ok(value);
        }

        let computation = {
            let mut in_flight = self.in_flight.lock().await;

            match in_flight.get(key) {
                Some(running) => {
                    debug!(cache = %self.name, key = %key, "Joining in-flight computation");
                    running.clone()
                }
                None => {
                    // Finished between the miss above and taking the lock
                    if let Some(value) = self.lookup(key, false).await {
                        return Ok(value);
                    }
                    let computation = self.computation(key.to_string(), producer);
                    in_flight.insert(key.to_string(), computation.clone());
                    computation
                }
            }
        };

        computation.await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut store = self.store.write().await;

        if store.remove_entry(key).is_some() {
            store.stats.invalidations += 1;
            store.update_stats(&self.config);
            debug!(cache = %self.name, key = %key, "Removed cache entry");
        }

        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut store = self.store.write().await;

        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        store.current_size_bytes = 0;
        store.stats.invalidations += count as u64;
        store.update_stats(&self.config);

        info!(cache = %self.name, "Cleared {} entries from cache", count);
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Background task removing expired entries every `cleanup_interval`.
/// Ends once the cache has been dropped.
pub async fn start_auto_cleanup(cache: Weak<MemoryCache>) {
    let interval = match cache.upgrade() {
        Some(cache) if cache.config.enable_auto_cleanup => cache.config.cleanup_interval,
        _ => return,
    };

    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;

        let Some(cache) = cache.upgrade() else {
            debug!("Cache dropped, stopping auto cleanup");
            return;
        };

        let removed = cache.cleanup_expired().await;
        if !removed.is_empty() {
            debug!(cache = %cache.name, "Auto cleanup removed {} entries", removed.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::producer;
    use serde_json::json;
    use std::time::Duration;

    fn cache_with(config: CacheConfig) -> MemoryCache {
        MemoryCache::new("test", config)
    }

    #[tokio::test]
    async fn test_basic_set_and_get() {
        let cache = cache_with(
            CacheConfig::builder()
                .default_ttl(Duration::from_secs(60))
                .max_entries(100)
                .build(),
        );

        cache.set("key1", json!("value1")).await.unwrap();

        let value = cache.try_get("key1").await.unwrap();
        assert_eq!(value, Some(json!("value1")));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = cache_with(CacheConfig::default());

        let value = cache.try_get("nonexistent").await.unwrap();
        assert_eq!(value, None);

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let cache = cache_with(CacheConfig::default());

        assert!(matches!(
            cache.try_get("").await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.set("", json!(1)).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = cache_with(
            CacheConfig::builder()
                .default_ttl(Duration::from_millis(100))
                .ttl_jitter(0.0)
                .build(),
        );

        cache.set("key1", json!("value1")).await.unwrap();
        assert!(cache.try_get("key1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.try_get("key1").await.unwrap().is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.evictions_ttl, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = cache_with(
            CacheConfig::builder()
                .default_ttl(Duration::from_secs(60))
                .max_entries(3)
                .enable_lru_eviction(true)
                .build(),
        );

        cache.set("key1", json!("value1")).await.unwrap();
        cache.set("key2", json!("value2")).await.unwrap();
        cache.set("key3", json!("value3")).await.unwrap();

        // Insert 4th entry, should evict key1 (least recently used)
        cache.set("key4", json!("value4")).await.unwrap();

        assert!(cache.try_get("key1").await.unwrap().is_none());
        assert!(cache.try_get("key2").await.unwrap().is_some());
        assert!(cache.try_get("key3").await.unwrap().is_some());
        assert!(cache.try_get("key4").await.unwrap().is_some());

        let stats = cache.stats().await;
        assert!(stats.evictions_size > 0);
    }

    #[tokio::test]
    async fn test_full_cache_without_eviction() {
        let cache = cache_with(
            CacheConfig::builder()
                .max_entries(1)
                .enable_lru_eviction(false)
                .build(),
        );

        cache.set("key1", json!(1)).await.unwrap();
        let result = cache.set("key2", json!(2)).await;
        assert!(matches!(result, Err(CacheError::CapacityExceeded(_))));

        // Replacing an existing key does not need room
        cache.set("key1", json!(3)).await.unwrap();
        assert_eq!(cache.try_get("key1").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_clear_and_clear_all() {
        let cache = cache_with(CacheConfig::default());

        cache.set("key1", json!("value1")).await.unwrap();
        cache.set("key2", json!("value2")).await.unwrap();

        cache.clear("key1").await.unwrap();
        assert!(!cache.contains_key("key1").await);
        assert!(cache.contains_key("key2").await);

        // Clearing a missing key is a no-op
        cache.clear("key1").await.unwrap();

        cache.clear_all().await.unwrap();
        assert_eq!(cache.len().await, 0);
        assert!(cache.is_empty().await);
        assert_eq!(cache.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let cache = cache_with(
            CacheConfig::builder()
                .default_ttl(Duration::from_millis(50))
                .ttl_jitter(0.0)
                .build(),
        );

        cache.set("key1", json!("value1")).await.unwrap();
        cache.set("key2", json!("value2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let removed = cache.cleanup_expired().await;
        assert_eq!(removed.len(), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_caches_result() {
        let cache = cache_with(CacheConfig::default());

        let value = cache
            .get_or_create("k", producer(async { Ok(json!(7)) }))
            .await
            .unwrap();
        assert_eq!(value, json!(7));

        // Second producer is never polled
        let value = cache
            .get_or_create(
                "k",
                producer(async { Err(CacheError::Backend("unreachable".to_string())) }),
            )
            .await
            .unwrap();
        assert_eq!(value, json!(7));

        let stats = cache.stats().await;
        assert_eq!(stats.computations, 1);
        assert_eq!(cache.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_get_or_create_failure_not_cached() {
        let cache = cache_with(CacheConfig::default());

        let result = cache
            .get_or_create(
                "k",
                producer(async { Err(CacheError::ProducerFailure("boom".to_string())) }),
            )
            .await;
        match result {
            Err(CacheError::ProducerFailure(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(!cache.contains_key("k").await);
        assert_eq!(cache.in_flight().await, 0);

        let value = cache
            .get_or_create("k", producer(async { Ok(json!("recovered")) }))
            .await
            .unwrap();
        assert_eq!(value, json!("recovered"));
    }

    #[tokio::test]
    async fn test_producer_error_keeps_its_variant() {
        let cache = cache_with(CacheConfig::default());

        let result = cache
            .get_or_create(
                "k",
                producer(async { Err(CacheError::Backend("source timeout".to_string())) }),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Backend(m)) if m == "source timeout"));
    }

    #[tokio::test]
    async fn test_panicking_producer_releases_key() {
        let cache = cache_with(CacheConfig::default());

        let result = cache
            .get_or_create(
                "k",
                producer(async {
                    if true {
                        panic!("source exploded");
                    }
                    Ok(json!(0))
                }),
            )
            .await;
        match result {
            Err(CacheError::ProducerFailure(message)) => assert!(message.contains("source exploded")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(cache.in_flight().await, 0);
        assert!(!cache.contains_key("k").await);

        let value = cache
            .get_or_create("k", producer(async { Ok(json!("healthy")) }))
            .await
            .unwrap();
        assert_eq!(value, json!("healthy"));
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = cache_with(CacheConfig::builder().enable_metrics(true).build());

        cache.set("key1", json!("value1")).await.unwrap();
        cache.try_get("key1").await.unwrap();
        cache.try_get("nonexistent").await.unwrap();

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!(stats.size_bytes > 0);
    }

    #[tokio::test]
    async fn test_auto_cleanup_stops_when_cache_dropped() {
        let cache = Arc::new(cache_with(
            CacheConfig::builder()
                .default_ttl(Duration::from_millis(10))
                .ttl_jitter(0.0)
                .cleanup_interval(Duration::from_millis(20))
                .build(),
        ));
        cache.set("key1", json!(1)).await.unwrap();

        let task = tokio::spawn(start_auto_cleanup(Arc::downgrade(&cache)));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.len().await, 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
