//! Two-Process Invalidation Demo
//!
//! Simulates two processes sharing one tier2 cache and one notification
//! channel, each with its own local tier.
//!
//! Usage:
//!   cargo run --example two_process_sync
//!
//! Environment variables:
//!   RUST_LOG - log filter (default: ouroboros_cache=debug)

use anyhow::Result;
use ouroboros_cache::sync::{LocalNotificationChannel, SynchronizedCache};
use ouroboros_cache::{
    producer, Cache, CacheConfig, CacheRegistry, LayeredCache, LayeredCachePolicy, MemoryCache,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CACHE: &str = "app.users";

struct Process {
    label: &'static str,
    registry: CacheRegistry,
    local: Arc<MemoryCache>,
}

impl Process {
    async fn start(
        label: &'static str,
        shared: &Arc<MemoryCache>,
        bus: &Arc<LocalNotificationChannel>,
    ) -> Result<Self> {
        let registry = CacheRegistry::new();
        let local = Arc::new(MemoryCache::new("local", CacheConfig::near_cache()));

        registry.register_notifier("bus", bus.clone());
        registry.register("local", Some(local.clone()))?;
        registry.register("shared", Some(shared.clone()))?;

        let policy = LayeredCachePolicy::new("local", "shared").with_sync_provider("bus");
        let cache = LayeredCache::from_policy(CACHE, &policy, &registry).await?;
        registry.register("app.*", Some(cache))?;

        info!("Process {} started (origin {})", label, registry.instance_id());
        Ok(Self {
            label,
            registry,
            local,
        })
    }

    fn cache(&self) -> Result<Arc<dyn Cache>> {
        self.registry
            .resolve(CACHE)?
            .ok_or_else(|| anyhow::anyhow!("{} is not registered", CACHE))
    }

    async fn report(&self, key: &str) -> Result<()> {
        let local = self.local.try_get(key).await?;
        let layered = self.cache()?.try_get(key).await?;
        info!(
            "  {}: tier1 = {:?}, layered read = {:?}",
            self.label, local, layered
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ouroboros_cache=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Two-Process Invalidation Demo ===");

    let shared = Arc::new(MemoryCache::new("shared", CacheConfig::default()));
    let bus = Arc::new(LocalNotificationChannel::new());

    let a = Process::start("A", &shared, &bus).await?;
    let b = Process::start("B", &shared, &bus).await?;

    info!("\n--- A computes user:1 ---");
    let user = a
        .cache()?
        .get_or_create("user:1", producer(async { Ok(json!({"name": "alice"})) }))
        .await?;
    info!("A computed {}", user);

    info!("\n--- B reads user:1 (repairs its tier1 from tier2) ---");
    b.report("user:1").await?;
    b.report("user:1").await?;

    info!("\n--- A updates user:1 ---");
    a.cache()?.set("user:1", json!({"name": "alice b."})).await?;
    a.report("user:1").await?;
    b.report("user:1").await?;

    info!("\n--- B clears everything ---");
    b.cache()?.clear_all().await?;
    a.report("user:1").await?;

    for process in [&a, &b] {
        let synchronized = process
            .registry
            .resolve_as::<SynchronizedCache<LayeredCache>>(CACHE)?
            .ok_or_else(|| anyhow::anyhow!("{} is not synchronized", CACHE))?;
        info!(
            "{} sync stats: {:?}, tier1 stats: {}",
            process.label,
            synchronized.synchronizer().stats(),
            process.local.stats().await
        );
    }
    info!("tier2 stats: {}", shared.stats().await);

    Ok(())
}
