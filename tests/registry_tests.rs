//! Integration tests for cache registration and name resolution

use ouroboros_cache::cache::{Cache, CacheConfig, MemoryCache};
use ouroboros_cache::{CacheError, CacheRegistry, LocalNotificationChannel, RegistryConfig};
use std::sync::Arc;
use std::thread;

fn memory(name: &str) -> Arc<dyn Cache> {
    Arc::new(MemoryCache::new(name, CacheConfig::near_cache()))
}

fn resolved_name(registry: &CacheRegistry, name: &str) -> Option<String> {
    registry
        .resolve(name)
        .unwrap()
        .map(|cache| cache.name().to_string())
}

#[test]
fn test_most_specific_pattern_wins() {
    let registry = CacheRegistry::new();
    registry.register("*", Some(memory("fallback"))).unwrap();
    registry.register("a.*", Some(memory("A"))).unwrap();
    registry.register("a.b.*", Some(memory("B"))).unwrap();
    registry.register("a.b.c", Some(memory("C"))).unwrap();

    assert_eq!(resolved_name(&registry, "a.b.c").as_deref(), Some("C"));
    assert_eq!(resolved_name(&registry, "a.b.d").as_deref(), Some("B"));
    assert_eq!(resolved_name(&registry, "a.x").as_deref(), Some("A"));
    assert_eq!(resolved_name(&registry, "z").as_deref(), Some("fallback"));
}

#[test]
fn test_no_catch_all_means_no_match() {
    let registry = CacheRegistry::new();
    registry.register("a.*", Some(memory("A"))).unwrap();

    assert_eq!(resolved_name(&registry, "b.c"), None);
    // Names are case-sensitive
    assert_eq!(resolved_name(&registry, "A.b"), None);
}

#[test]
fn test_removal_falls_back_to_wider_pattern() {
    let registry = CacheRegistry::new();
    registry.register("a.*", Some(memory("A"))).unwrap();
    registry.register("a.b", Some(memory("B"))).unwrap();

    registry.remove("a.b").unwrap();
    assert_eq!(resolved_name(&registry, "a.b").as_deref(), Some("A"));

    // Removing an unknown pattern is a no-op
    registry.remove("never.registered").unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_empty_inputs_rejected() {
    let registry = CacheRegistry::new();

    assert!(matches!(
        registry.register("", Some(memory("x"))),
        Err(CacheError::InvalidArgument(_))
    ));
    assert!(matches!(
        registry.resolve(""),
        Err(CacheError::InvalidArgument(_))
    ));
}

#[test]
fn test_resolve_as_wrong_type() {
    let registry = CacheRegistry::new();
    registry.register("a", Some(memory("a"))).unwrap();

    let result = registry.resolve_as::<ouroboros_cache::LayeredCache>("a");
    assert!(matches!(result, Err(CacheError::TypeMismatch { .. })));

    let found = registry.resolve_as::<MemoryCache>("a").unwrap();
    assert!(found.is_some());
    assert!(registry.resolve_as::<MemoryCache>("b").unwrap().is_none());
}

#[test]
fn test_concurrent_resolve_during_registration() {
    let registry = Arc::new(CacheRegistry::new());
    registry.register("app.*", Some(memory("v0"))).unwrap();

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for i in 1..=200 {
                registry
                    .register("app.*", Some(memory(&format!("v{}", i))))
                    .unwrap();
                registry
                    .register(&format!("other.{}", i), Some(memory("other")))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    // Every resolution sees some complete registration
                    let name = resolved_name(&registry, "app.users").unwrap();
                    assert!(name.starts_with('v'));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(resolved_name(&registry, "app.users").as_deref(), Some("v200"));
    assert_eq!(registry.len(), 201);
}

#[test]
fn test_global_registry_is_shared() {
    let pattern = "registry-tests.global.*";
    CacheRegistry::global()
        .register(pattern, Some(memory("global-cache")))
        .unwrap();

    let from_other_thread = thread::spawn(|| {
        resolved_name(CacheRegistry::global(), "registry-tests.global.x")
    })
    .join()
    .unwrap();
    assert_eq!(from_other_thread.as_deref(), Some("global-cache"));

    CacheRegistry::global().remove(pattern).unwrap();
    assert_eq!(resolved_name(CacheRegistry::global(), "registry-tests.global.x"), None);
}

#[test]
fn test_drain_removes_caches_and_notifiers() {
    let registry = CacheRegistry::new();
    registry.register("app.*", Some(memory("app"))).unwrap();
    registry.register("local", Some(memory("local"))).unwrap();
    registry.register_notifier("bus", Arc::new(LocalNotificationChannel::new()));
    let instance_id = registry.instance_id();

    registry.drain();

    assert!(registry.is_empty());
    assert!(registry.list_names().is_empty());
    assert_eq!(resolved_name(&registry, "app.users"), None);
    assert!(registry.notifier("bus").is_none());
    assert_eq!(registry.instance_id(), instance_id);

    // Usable again after teardown
    registry.register("app.*", Some(memory("fresh"))).unwrap();
    assert_eq!(resolved_name(&registry, "app.users").as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_configuration_builds_working_caches() {
    let registry = CacheRegistry::new();
    let config = RegistryConfig::from_json(
        r#"{
            "caches": [
                { "name": "local",  "kind": { "type": "memory", "max_entries": 100 } },
                { "name": "shared", "kind": { "type": "memory" } },
                { "name": "app.*",  "kind": { "type": "layered", "tier1": "local", "tier2": "shared" } }
            ]
        }"#,
    )
    .unwrap();
    config.apply(&registry).await.unwrap();

    let cache = registry.resolve("app.users").unwrap().unwrap();
    cache.set("k", serde_json::json!(1)).await.unwrap();

    let shared = registry.resolve_as::<MemoryCache>("shared").unwrap().unwrap();
    assert!(shared.contains_key("k").await);
    let local = registry.resolve_as::<MemoryCache>("local").unwrap().unwrap();
    assert_eq!(local.config().max_entries, 100);
}
