//! Publish/subscribe transport for invalidation events
//!
//! The core only consumes [`NotificationChannel`]; delivery guarantees belong
//! to the implementation. [`LocalNotificationChannel`] is an in-process bus
//! that delivers every event to every subscriber before `publish` returns.

use crate::error::{CacheError, Result};
use crate::sync::event::InvalidationEvent;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked for each delivered event
pub type EventHandler = Arc<dyn Fn(InvalidationEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifies one subscription for [`NotificationChannel::unsubscribe`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub topic: String,
    pub id: u64,
}

/// Transport used to fan invalidation events out to other processes
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, topic: &str, event: InvalidationEvent) -> Result<()>;

    async fn subscribe(&self, topic: &str, handler: EventHandler) -> Result<SubscriptionHandle>;

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;
}

/// In-process pub/sub bus
///
/// Events travel as JSON, so subscribers receive exactly what an external
/// transport would carry.
pub struct LocalNotificationChannel {
    subscribers: RwLock<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_id: AtomicU64,
    available: AtomicBool,
    delivered: AtomicU64,
}

impl Default for LocalNotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNotificationChannel {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            available: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
        }
    }

    /// Simulate the transport going down (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total events handed to subscribers
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Synchronization(
                "notification channel is unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl NotificationChannel for LocalNotificationChannel {
    async fn publish(&self, topic: &str, event: InvalidationEvent) -> Result<()> {
        self.ensure_available()?;

        let payload = serde_json::to_string(&event)?;
        // Handlers run without the lock so they may publish or unsubscribe
        let handlers: Vec<EventHandler> = self
            .subscribers
            .read()
            .get(topic)
            .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        debug!(topic = %topic, subscribers = handlers.len(), "Publishing invalidation");

        for handler in handlers {
            match serde_json::from_str::<InvalidationEvent>(&payload) {
                Ok(event) => {
                    handler(event).await;
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => warn!(topic = %topic, "Undeliverable invalidation payload: {}", e),
            }
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: EventHandler) -> Result<SubscriptionHandle> {
        self.ensure_available()?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));

        debug!(topic = %topic, id, "Subscribed");
        Ok(SubscriptionHandle {
            topic: topic.to_string(),
            id,
        })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let mut subscribers = self.subscribers.write();
        if let Some(subs) = subscribers.get_mut(&handle.topic) {
            subs.retain(|(id, _)| *id != handle.id);
            if subs.is_empty() {
                subscribers.remove(&handle.topic);
            }
        }

        debug!(topic = %handle.topic, id = handle.id, "Unsubscribed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event::InvalidationReason;
    use parking_lot::Mutex;
    use uuid::Uuid;

    fn recording_handler(seen: Arc<Mutex<Vec<InvalidationEvent>>>) -> EventHandler {
        Arc::new(move |event| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().push(event);
            })
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_topic_subscribers_only() {
        let channel = LocalNotificationChannel::new();
        let users = Arc::new(Mutex::new(Vec::new()));
        let orders = Arc::new(Mutex::new(Vec::new()));

        channel
            .subscribe("users", recording_handler(users.clone()))
            .await
            .unwrap();
        channel
            .subscribe("orders", recording_handler(orders.clone()))
            .await
            .unwrap();

        let event =
            InvalidationEvent::for_key("users", "u1", InvalidationReason::Cleared, Uuid::new_v4());
        channel.publish("users", event.clone()).await.unwrap();

        assert_eq!(users.lock().as_slice(), &[event]);
        assert!(orders.lock().is_empty());
        assert_eq!(channel.delivered(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let channel = LocalNotificationChannel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = channel
            .subscribe("users", recording_handler(seen.clone()))
            .await
            .unwrap();
        assert_eq!(channel.subscriber_count("users"), 1);

        channel.unsubscribe(&handle).await.unwrap();
        assert_eq!(channel.subscriber_count("users"), 0);

        channel
            .publish("users", InvalidationEvent::for_all("users", Uuid::new_v4()))
            .await
            .unwrap();
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_channel() {
        let channel = LocalNotificationChannel::new();
        channel.set_available(false);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let result = channel.subscribe("users", recording_handler(seen)).await;
        assert!(matches!(result, Err(CacheError::Synchronization(_))));

        let result = channel
            .publish("users", InvalidationEvent::for_all("users", Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(CacheError::Synchronization(_))));
    }
}
