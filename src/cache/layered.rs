//! Two-tier cache: a fast local tier in front of an authoritative shared tier
//!
//! ```text
//! try_get        → tier1 ──miss──→ tier2 ──hit──→ repair tier1
//! set / clear    → tier2 then tier1
//! get_or_create  → tier1.get_or_create(tier2.get_or_create(producer))
//! ```

use crate::cache::{
    config::LayeredCachePolicy,
    types::{CacheValue, Tier},
    validate_key, Cache, Producer,
};
use crate::error::{CacheError, Result};
use crate::registry::CacheRegistry;
use crate::sync::SynchronizedCache;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, info};

/// A cache composed of two independently registered tiers
///
/// The layered cache does not own its tiers; it holds references to them for
/// as long as it lives. Tier 1 is assumed fresher than tier 2 and is never
/// checked against it.
pub struct LayeredCache {
    name: String,
    tier1: Arc<dyn Cache>,
    tier2: Arc<dyn Cache>,
    policy: LayeredCachePolicy,
}

impl std::fmt::Debug for LayeredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredCache")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

impl LayeredCache {
    /// Compose two tiers directly
    pub fn new(
        name: impl Into<String>,
        tier1: Arc<dyn Cache>,
        tier2: Arc<dyn Cache>,
    ) -> Result<Self> {
        let policy = LayeredCachePolicy::new(tier1.name(), tier2.name());
        Self::build(name.into(), tier1, tier2, policy)
    }

    /// Resolve both tiers through the registry and attach the configured
    /// synchronization provider, if any
    ///
    /// With a provider the returned cache is a [`SynchronizedCache`] wrapping
    /// the layered cache. Failure to subscribe fails construction.
    pub async fn from_policy(
        name: impl Into<String>,
        policy: &LayeredCachePolicy,
        registry: &CacheRegistry,
    ) -> Result<Arc<dyn Cache>> {
        let name = name.into();
        let tier1 = resolve_tier(registry, &name, "tier1", &policy.tier1)?;
        let tier2 = resolve_tier(registry, &name, "tier2", &policy.tier2)?;

        // Record what the tier names actually resolved to
        let resolved = LayeredCachePolicy {
            tier1: tier1.name().to_string(),
            tier2: tier2.name().to_string(),
            sync_provider: policy.sync_provider.clone(),
        };
        let layered = Arc::new(Self::build(name, tier1, tier2, resolved)?);

        match &policy.sync_provider {
            None => Ok(layered as Arc<dyn Cache>),
            Some(provider) => {
                let channel = registry.notifier(provider).ok_or_else(|| {
                    CacheError::Synchronization(format!(
                        "notification provider '{}' for cache '{}' is not registered",
                        provider, layered.name
                    ))
                })?;
                let synchronized =
                    SynchronizedCache::attach(layered, channel, registry.instance_id()).await?;
                Ok(Arc::new(synchronized) as Arc<dyn Cache>)
            }
        }
    }

    fn build(
        name: String,
        tier1: Arc<dyn Cache>,
        tier2: Arc<dyn Cache>,
        policy: LayeredCachePolicy,
    ) -> Result<Self> {
        if tier1.name() == tier2.name() {
            return Err(CacheError::Configuration(format!(
                "tier2 must not be the same as tier1 in layered cache '{}', both are '{}'",
                name,
                tier1.name()
            )));
        }

        if tier1.name() == name || tier2.name() == name {
            return Err(CacheError::Configuration(format!(
                "layered cache '{}' must not use itself as a tier",
                name
            )));
        }

        info!(
            cache = %name,
            tier1 = %tier1.name(),
            tier2 = %tier2.name(),
            "Created layered cache"
        );

        Ok(Self {
            name,
            tier1,
            tier2,
            policy,
        })
    }

    pub fn policy(&self) -> &LayeredCachePolicy {
        &self.policy
    }

    pub fn tier1(&self) -> &Arc<dyn Cache> {
        &self.tier1
    }

    pub fn tier2(&self) -> &Arc<dyn Cache> {
        &self.tier2
    }
}

fn resolve_tier(
    registry: &CacheRegistry,
    cache_name: &str,
    tier: &str,
    tier_name: &str,
) -> Result<Arc<dyn Cache>> {
    registry.resolve(tier_name)?.ok_or_else(|| {
        CacheError::Configuration(format!(
            "{} '{}' of layered cache '{}' is not registered",
            tier, tier_name, cache_name
        ))
    })
}

#[async_trait]
impl Cache for LayeredCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheValue>> {
        validate_key(key)?;

        if let Some(value) = self.tier1.try_get(key).await? {
            debug!(cache = %self.name, key = %key, tier = %Tier::Local, "Layered hit");
            return Ok(Some(value));
        }

        match self.tier2.try_get(key).await? {
            Some(value) => {
                debug!(cache = %self.name, key = %key, tier = %Tier::Shared, "Layered hit, repairing tier1");
                self.tier1.set(key, value.clone()).await?;
                Ok(Some(value))
            }
            None => {
                debug!(cache = %self.name, key = %key, "Layered miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue) -> Result<()> {
        validate_key(key)?;

        // tier2 first; a failed tier2 write leaves tier1 untouched
        self.tier2.set(key, value.clone()).await?;
        self.tier1.set(key, value).await
    }

    async fn get_or_create(&self, key: &str, producer: Producer) -> Result<CacheValue> {
        validate_key(key)?;

        let tier2 = Arc::clone(&self.tier2);
        let owned_key = key.to_string();
        let through_tier2: Producer = Box::pin(async move {
            tier2.get_or_create(&owned_key, producer).await
        });

        self.tier1.get_or_create(key, through_tier2).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        self.tier2.clear(key).await?;
        self.tier1.clear(key).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.tier2.clear_all().await?;
        self.tier1.clear_all().await
    }

    fn local_tier(&self) -> Option<Arc<dyn Cache>> {
        Some(Arc::clone(&self.tier1))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
