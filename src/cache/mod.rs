//! # Cache capability and tiers
//!
//! Every storage tier, the layered composite and the synchronizing decorator
//! implement the same [`Cache`] trait, so application code holds an
//! `Arc<dyn Cache>` without knowing what backs it.
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{producer, Cache, CacheConfig, LayeredCache, MemoryCache};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> ouroboros_cache::Result<()> {
//! let local: Arc<dyn Cache> = Arc::new(MemoryCache::new("local", CacheConfig::near_cache()));
//! let shared: Arc<dyn Cache> = Arc::new(MemoryCache::new("shared", CacheConfig::default()));
//! let users = LayeredCache::new("users", local, shared)?;
//!
//! let value = users
//!     .get_or_create("user:1", producer(async { Ok(json!({"name": "alice"})) }))
//!     .await?;
//! assert_eq!(value["name"], "alice");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod layered;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder, LayeredCachePolicy};
pub use entry::{EntryMetadata, StoredEntry};
pub use layered::LayeredCache;
pub use store::{start_auto_cleanup, MemoryCache};
pub use types::{CacheKey, CacheStats, CacheValue, Tier};

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Deferred computation handed to [`Cache::get_or_create`]
///
/// It is polled only when no tier can answer; otherwise it is dropped unrun.
pub type Producer = BoxFuture<'static, Result<CacheValue>>;

/// Box a future into a [`Producer`]
pub fn producer<F>(future: F) -> Producer
where
    F: Future<Output = Result<CacheValue>> + Send + 'static,
{
    Box::pin(future)
}

/// Capability implemented by every cache tier and composite
///
/// A cache is identified by its [`name`](Cache::name); two handles with the
/// same name are the same logical cache.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Logical name of this cache
    fn name(&self) -> &str;

    /// Look up a key without computing anything
    async fn try_get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Store a value
    async fn set(&self, key: &str, value: CacheValue) -> Result<()>;

    /// Return the cached value or run `producer` once for all concurrent
    /// callers asking for the same missing key
    async fn get_or_create(&self, key: &str, producer: Producer) -> Result<CacheValue>;

    /// Remove one key
    async fn clear(&self, key: &str) -> Result<()>;

    /// Remove every key
    async fn clear_all(&self) -> Result<()>;

    /// Tier that applies invalidations received from other processes.
    /// `None` means the cache itself.
    fn local_tier(&self) -> Option<Arc<dyn Cache>> {
        None
    }

    /// Narrowing hook for typed resolution
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Typed access on top of the opaque value contract
impl dyn Cache {
    /// Look up and decode a value
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.try_get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a value
    pub async fn set_typed<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value).await
    }

    /// Typed [`Cache::get_or_create`]
    pub async fn get_or_create_typed<T, F, Fut>(&self, key: &str, make: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let future = make();
        let value = self
            .get_or_create(
                key,
                producer(async move { Ok(serde_json::to_value(future.await?)?) }),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "cache key must not be empty".to_string(),
        ));
    }
    Ok(())
}
