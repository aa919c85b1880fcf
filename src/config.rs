//! Declarative registry configuration
//!
//! ```json
//! {
//!   "caches": [
//!     { "name": "local",  "kind": { "type": "memory", "max_entries": 1000 } },
//!     { "name": "shared", "kind": { "type": "memory" } },
//!     { "name": "app.*",  "kind": { "type": "layered", "tier1": "local", "tier2": "shared" } },
//!     { "name": "legacy", "action": "remove" }
//!   ]
//! }
//! ```
//!
//! Declarations are applied in order, so a layered cache can only name tiers
//! declared (or registered) before it.

use crate::cache::{
    start_auto_cleanup, Cache, CacheConfig, LayeredCache, LayeredCachePolicy, MemoryCache,
};
use crate::error::{CacheError, Result};
use crate::registry::CacheRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub caches: Vec<CacheDeclaration>,
}

/// One add/remove instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDeclaration {
    /// Registry pattern; also the name of the created cache
    pub name: String,

    #[serde(default)]
    pub action: ConfigAction,

    /// Required for `add`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CacheKind>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    #[default]
    Add,
    Remove,
}

/// What to build for an `add` declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheKind {
    Memory(CacheConfig),
    Layered(LayeredCachePolicy),
}

impl RegistryConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply every declaration to `registry`, stopping at the first failure
    pub async fn apply(&self, registry: &CacheRegistry) -> Result<()> {
        for declaration in &self.caches {
            declaration.apply(registry).await?;
        }

        info!("Applied {} cache declarations", self.caches.len());
        Ok(())
    }
}

impl CacheDeclaration {
    async fn apply(&self, registry: &CacheRegistry) -> Result<()> {
        match self.action {
            ConfigAction::Remove => registry.remove(&self.name),
            ConfigAction::Add => {
                let kind = self.kind.as_ref().ok_or_else(|| {
                    CacheError::Configuration(format!(
                        "cache '{}' is added without a kind",
                        self.name
                    ))
                })?;

                let cache: Arc<dyn Cache> = match kind {
                    CacheKind::Memory(config) => {
                        config.validate()?;
                        let memory = Arc::new(MemoryCache::new(self.name.clone(), config.clone()));
                        if config.enable_auto_cleanup {
                            tokio::spawn(start_auto_cleanup(Arc::downgrade(&memory)));
                        }
                        memory as Arc<dyn Cache>
                    }
                    CacheKind::Layered(policy) => {
                        LayeredCache::from_policy(self.name.clone(), policy, registry).await?
                    }
                };

                registry.register(&self.name, Some(cache))
            }
        }
    }
}
