//! Cross-process invalidation
//!
//! ```text
//! Process A: cache.clear("k")
//!   ↓ tier2.clear, tier1.clear, publish {cache, "k", origin A}
//! Channel
//!   ↓
//! Process A: origin matches → ignored
//! Process B: tier1.clear("k")   (tier2 is shared and already current)
//! ```

use crate::cache::{types::CacheValue, Cache, Producer};
use crate::error::{CacheError, Result};
use crate::sync::channel::{EventHandler, NotificationChannel, SubscriptionHandle};
use crate::sync::event::{topic_for, InvalidationEvent, InvalidationReason};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Detached,
    /// Subscription requested; incoming events are dropped
    Subscribing,
    Active,
}

/// Counters exposed for monitoring and tests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub published: u64,
    /// Remote events applied to the local tier
    pub applied: u64,
    /// Own events received back from the channel
    pub ignored_self: u64,
    /// Events received while not active or for another cache
    pub dropped: u64,
}

/// State reachable from the subscription handler
struct SyncShared {
    cache_name: String,
    origin: Uuid,
    local: Arc<dyn Cache>,
    state: Mutex<SyncState>,
    published: AtomicU64,
    applied: AtomicU64,
    ignored_self: AtomicU64,
    dropped: AtomicU64,
}

impl SyncShared {
    fn state(&self) -> SyncState {
        *self.state.lock()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock() = state;
    }

    async fn apply(&self, event: InvalidationEvent) {
        if self.state() != SyncState::Active {
            warn!(cache = %self.cache_name, "Dropping invalidation received while not active");
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        if event.origin == self.origin {
            debug!(cache = %self.cache_name, key = ?event.key, "Ignoring own invalidation");
            self.ignored_self.fetch_add(1, Ordering::SeqCst);
            return;
        }

        if event.cache_name != self.cache_name {
            debug!(cache = %self.cache_name, other = %event.cache_name, "Ignoring invalidation for another cache");
            self.dropped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let outcome = match &event.key {
            Some(key) => self.local.clear(key).await,
            None => self.local.clear_all().await,
        };

        match outcome {
            Ok(()) => {
                debug!(
                    cache = %self.cache_name,
                    tier = %self.local.name(),
                    key = ?event.key,
                    reason = %event.reason,
                    origin = %event.origin,
                    "Applied remote invalidation"
                );
                self.applied.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => warn!(
                cache = %self.cache_name,
                key = ?event.key,
                "Failed to apply remote invalidation: {}",
                e
            ),
        }
    }
}

/// Publishes local mutations of one cache and applies remote ones to its
/// local tier
pub struct InvalidationSynchronizer {
    shared: Arc<SyncShared>,
    channel: Arc<dyn NotificationChannel>,
    topic: String,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl InvalidationSynchronizer {
    /// Subscribe to invalidations of `cache_name`, applying them to `local`
    ///
    /// Fails with [`CacheError::Synchronization`] if the subscription cannot
    /// be established.
    pub async fn attach(
        cache_name: impl Into<String>,
        local: Arc<dyn Cache>,
        channel: Arc<dyn NotificationChannel>,
        origin: Uuid,
    ) -> Result<Self> {
        let cache_name = cache_name.into();
        let topic = topic_for(&cache_name);

        let shared = Arc::new(SyncShared {
            cache_name,
            origin,
            local,
            state: Mutex::new(SyncState::Subscribing),
            published: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            ignored_self: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });

        let weak: Weak<SyncShared> = Arc::downgrade(&shared);
        let handler: EventHandler = Arc::new(move |event| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    shared.apply(event).await;
                }
            })
        });

        let handle = match channel.subscribe(&topic, handler).await {
            Ok(handle) => handle,
            Err(e) => {
                shared.set_state(SyncState::Detached);
                return Err(CacheError::Synchronization(format!(
                    "cannot subscribe cache '{}' to '{}': {}",
                    shared.cache_name, topic, e
                )));
            }
        };

        shared.set_state(SyncState::Active);
        info!(
            cache = %shared.cache_name,
            topic = %topic,
            origin = %origin,
            "Invalidation synchronizer active"
        );

        Ok(Self {
            shared,
            channel,
            topic,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> SyncState {
        self.shared.state()
    }

    pub fn origin(&self) -> Uuid {
        self.shared.origin
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            published: self.shared.published.load(Ordering::SeqCst),
            applied: self.shared.applied.load(Ordering::SeqCst),
            ignored_self: self.shared.ignored_self.load(Ordering::SeqCst),
            dropped: self.shared.dropped.load(Ordering::SeqCst),
        }
    }

    /// Announce a local mutation. `key == None` announces a clear-all.
    pub async fn publish(&self, key: Option<&str>, reason: InvalidationReason) -> Result<()> {
        if self.state() != SyncState::Active {
            warn!(cache = %self.shared.cache_name, "Synchronizer detached, not publishing");
            return Ok(());
        }

        let event = match key {
            Some(key) => {
                InvalidationEvent::for_key(&self.shared.cache_name, key, reason, self.shared.origin)
            }
            None => InvalidationEvent::for_all(&self.shared.cache_name, self.shared.origin),
        };

        self.channel
            .publish(&self.topic, event)
            .await
            .map_err(|e| match e {
                CacheError::Synchronization(_) => e,
                other => CacheError::Synchronization(other.to_string()),
            })?;

        self.shared.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Stop receiving events and unsubscribe
    pub async fn detach(&self) -> Result<()> {
        self.shared.set_state(SyncState::Detached);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            self.channel.unsubscribe(&handle).await?;
            info!(cache = %self.shared.cache_name, "Invalidation synchronizer detached");
        }

        Ok(())
    }
}

impl Drop for InvalidationSynchronizer {
    fn drop(&mut self) {
        self.shared.set_state(SyncState::Detached);

        if let Some(handle) = self.handle.lock().take() {
            // Best effort: unsubscribing is async
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let channel = Arc::clone(&self.channel);
                runtime.spawn(async move {
                    if let Err(e) = channel.unsubscribe(&handle).await {
                        warn!(topic = %handle.topic, "Failed to unsubscribe on drop: {}", e);
                    }
                });
            }
        }
    }
}

/// Decorator that publishes every mutation of the wrapped cache, including
/// mutations that fail part-way
///
/// Remote invalidations are applied to the wrapped cache's local tier
/// directly, never through this decorator, so they are not republished.
pub struct SynchronizedCache<C: Cache> {
    inner: Arc<C>,
    synchronizer: InvalidationSynchronizer,
}

impl<C: Cache> SynchronizedCache<C> {
    pub async fn attach(
        inner: Arc<C>,
        channel: Arc<dyn NotificationChannel>,
        origin: Uuid,
    ) -> Result<Self> {
        let local = inner
            .local_tier()
            .unwrap_or_else(|| Arc::clone(&inner) as Arc<dyn Cache>);
        let synchronizer =
            InvalidationSynchronizer::attach(inner.name(), local, channel, origin).await?;

        Ok(Self {
            inner,
            synchronizer,
        })
    }

    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    pub fn synchronizer(&self) -> &InvalidationSynchronizer {
        &self.synchronizer
    }

    /// Publish after a mutation, whatever its outcome
    ///
    /// A failed mutation may still have reached the shared tier (a layered
    /// cache writes tier2 before tier1), so other processes are told to drop
    /// their copy either way. The mutation's own error takes precedence over
    /// a publish failure.
    async fn announce(
        &self,
        key: Option<&str>,
        reason: InvalidationReason,
        outcome: Result<()>,
    ) -> Result<()> {
        // Rejected before any tier was touched
        if let Err(CacheError::InvalidArgument(_)) = &outcome {
            return outcome;
        }

        if let Err(e) = &outcome {
            warn!(
                cache = %self.inner.name(),
                key = ?key,
                "Mutation failed, publishing invalidation anyway: {}",
                e
            );
        }

        let published = self.synchronizer.publish(key, reason).await;
        outcome?;
        published
    }
}

#[async_trait]
impl<C: Cache> Cache for SynchronizedCache<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.inner.try_get(key).await
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
        let outcome = self.inner.set(key, value).await;
        self.announce(Some(key), InvalidationReason::Updated, outcome)
            .await
    }

    async fn get_or_create(&self, key: &str, producer: Producer) -> Result<CacheValue> {
        self.inner.get_or_create(key, producer).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let outcome = self.inner.clear(key).await;
        self.announce(Some(key), InvalidationReason::Cleared, outcome)
            .await
    }

    async fn clear_all(&self) -> Result<()> {
        let outcome = self.inner.clear_all().await;
        self.announce(None, InvalidationReason::ClearedAll, outcome)
            .await
    }

    fn local_tier(&self) -> Option<Arc<dyn Cache>> {
        self.inner.local_tier()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
