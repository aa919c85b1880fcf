//! # Cache registry
//!
//! Resolves a dotted cache name to the cache registered under the most
//! specific matching pattern:
//!
//! - exact patterns beat wildcard patterns covering the same name
//! - among wildcards the longest literal prefix wins
//! - equal candidates resolve to the pattern registered first
//! - a name nothing covers resolves to `None`
//!
//! ```rust
//! use ouroboros_cache::{cache::{Cache, MemoryCache}, CacheRegistry};
//! use std::sync::Arc;
//!
//! let registry = CacheRegistry::new();
//! registry.register("app.*", Some(Arc::new(MemoryCache::with_defaults("app.*")))).unwrap();
//! registry.register("app.users", Some(Arc::new(MemoryCache::with_defaults("app.users")))).unwrap();
//!
//! let users = registry.resolve("app.users").unwrap().unwrap();
//! assert_eq!(users.name(), "app.users");
//! let orders = registry.resolve("app.orders").unwrap().unwrap();
//! assert_eq!(orders.name(), "app.*");
//! assert!(registry.resolve("other").unwrap().is_none());
//! ```

pub mod pattern;

pub use pattern::{CacheNamePattern, WILDCARD};

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::sync::NotificationChannel;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

static GLOBAL: Lazy<CacheRegistry> = Lazy::new(CacheRegistry::new);

/// One registry row
#[derive(Clone)]
pub struct RegistryEntry {
    pub pattern: CacheNamePattern,
    pub cache: Arc<dyn Cache>,
}

/// Thread-safe mapping from name pattern to cache
///
/// Readers clone the current snapshot under a short read lock and score it
/// without holding any lock. Writers publish a new snapshot under the write
/// lock, so a reader never observes a half-applied registration.
pub struct CacheRegistry {
    entries: RwLock<Arc<Vec<RegistryEntry>>>,
    notifiers: RwLock<HashMap<String, Arc<dyn NotificationChannel>>>,
    instance_id: Uuid,
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::with_instance_id(Uuid::new_v4())
    }

    /// Create a registry with a fixed origin identifier
    pub fn with_instance_id(instance_id: Uuid) -> Self {
        debug!(instance_id = %instance_id, "Creating cache registry");
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            notifiers: RwLock::new(HashMap::new()),
            instance_id,
        }
    }

    /// Process-wide default registry, created on first use
    ///
    /// Prefer passing a registry explicitly; this exists for the outermost
    /// composition point only. Call [`drain`](Self::drain) at shutdown.
    pub fn global() -> &'static CacheRegistry {
        &GLOBAL
    }

    /// Origin identifier of this process instance, stamped on every
    /// invalidation event published by caches built from this registry
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Register `cache` under `pattern`, replacing any previous registration
    /// of the same pattern text. `None` removes the registration.
    pub fn register(&self, pattern: &str, cache: Option<Arc<dyn Cache>>) -> Result<()> {
        let pattern = CacheNamePattern::parse(pattern)?;
        let mut entries = self.entries.write();
        let mut next: Vec<RegistryEntry> = entries.as_ref().clone();

        match cache {
            Some(cache) => {
                info!(pattern = %pattern, cache = %cache.name(), "Registering cache");
                match next.iter_mut().find(|e| e.pattern == pattern) {
                    Some(existing) => existing.cache = cache,
                    None => next.push(RegistryEntry { pattern, cache }),
                }
            }
            None => {
                let before = next.len();
                next.retain(|e| e.pattern != pattern);
                if next.len() != before {
                    info!(pattern = %pattern, "Removed cache registration");
                }
            }
        }

        *entries = Arc::new(next);
        Ok(())
    }

    pub fn remove(&self, pattern: &str) -> Result<()> {
        self.register(pattern, None)
    }

    pub fn remove_all(&self) {
        let mut entries = self.entries.write();
        info!("Removing all {} cache registrations", entries.len());
        *entries = Arc::new(Vec::new());
    }

    /// Current registrations, in registration order
    pub fn snapshot(&self) -> Arc<Vec<RegistryEntry>> {
        Arc::clone(&self.entries.read())
    }

    /// Resolve `name` to the most specific registered cache
    pub fn resolve(&self, name: &str) -> Result<Option<Arc<dyn Cache>>> {
        if name.is_empty() {
            return Err(CacheError::InvalidArgument(
                "cache name must not be empty".to_string(),
            ));
        }

        let snapshot = self.snapshot();
        let mut best: Option<(&RegistryEntry, (usize, bool))> = None;

        for entry in snapshot.iter().filter(|e| e.pattern.covers(name)) {
            let rank = (entry.pattern.score(name), !entry.pattern.has_wildcard());
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((entry, rank));
            }
        }

        let resolved = best.map(|(entry, _)| Arc::clone(&entry.cache));
        debug!(
            name = %name,
            resolved = ?resolved.as_ref().map(|c| c.name().to_string()),
            "Resolved cache"
        );
        Ok(resolved)
    }

    /// Resolve `name` and narrow it to the concrete cache type `T`
    pub fn resolve_as<T: Cache>(&self, name: &str) -> Result<Option<Arc<T>>> {
        let Some(cache) = self.resolve(name)? else {
            return Ok(None);
        };

        let resolved_name = cache.name().to_string();
        cache
            .into_any()
            .downcast::<T>()
            .map(Some)
            .map_err(|_| CacheError::TypeMismatch {
                name: resolved_name,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Names of every registered cache (not their patterns)
    pub fn list_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|e| e.cache.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Register a named notification provider for synchronized caches
    pub fn register_notifier(&self, provider: impl Into<String>, channel: Arc<dyn NotificationChannel>) {
        let provider = provider.into();
        info!(provider = %provider, "Registering notification provider");
        self.notifiers.write().insert(provider, channel);
    }

    pub fn notifier(&self, provider: &str) -> Option<Arc<dyn NotificationChannel>> {
        self.notifiers.read().get(provider).cloned()
    }

    /// Drop every registration and notification provider
    pub fn drain(&self) {
        self.remove_all();
        self.notifiers.write().clear();
    }
}
