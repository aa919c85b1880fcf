//! # Ouroboros Cache (ouroboros-cache)
//!
//! Named caches behind a registry, two-tier composition and cross-process
//! invalidation.
//!
//! ## Features
//!
//! - Registry resolving dotted names with exact and wildcard (`app.*`) patterns,
//!   most specific match wins
//! - Layered caches: a fast local tier in front of a shared tier, with
//!   read-through repair and write-through ordering
//! - Single-flight `get_or_create` that stays single-flight across both tiers
//! - Invalidation events over a pluggable pub/sub channel keep every
//!   process's local tier coherent, with self-echo suppression
//!
//! ## Example
//!
//! ```no_run
//! use ouroboros_cache::cache::{producer, Cache, CacheConfig, LayeredCachePolicy, MemoryCache};
//! use ouroboros_cache::sync::LocalNotificationChannel;
//! use ouroboros_cache::{CacheRegistry, LayeredCache};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = CacheRegistry::new();
//!     registry.register_notifier("bus", Arc::new(LocalNotificationChannel::new()));
//!     registry.register("local", Some(Arc::new(MemoryCache::new("local", CacheConfig::near_cache()))))?;
//!     registry.register("shared", Some(Arc::new(MemoryCache::new("shared", CacheConfig::default()))))?;
//!
//!     let policy = LayeredCachePolicy::new("local", "shared").with_sync_provider("bus");
//!     let users = LayeredCache::from_policy("app.users", &policy, &registry).await?;
//!     registry.register("app.users", Some(users))?;
//!
//!     let cache = registry.resolve("app.users")?.expect("registered above");
//!     let user = cache
//!         .get_or_create("user:1", producer(async { Ok(json!({"name": "alice"})) }))
//!         .await?;
//!     println!("{}", user);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod sync;

// Re-export main types for convenience
pub use cache::{
    producer, Cache, CacheConfig, CacheKey, CacheStats, CacheValue, LayeredCache,
    LayeredCachePolicy, MemoryCache, Producer,
};
pub use config::{CacheDeclaration, CacheKind, ConfigAction, RegistryConfig};
pub use error::{CacheError, Result};
pub use registry::{CacheNamePattern, CacheRegistry, RegistryEntry};
pub use sync::{
    InvalidationEvent, InvalidationSynchronizer, LocalNotificationChannel, NotificationChannel,
    SyncState, SynchronizedCache,
};
