//! # Cross-process invalidation
//!
//! Processes sharing a tier-2 cache keep their tier-1 caches coherent by
//! exchanging [`InvalidationEvent`]s over a [`NotificationChannel`]:
//!
//! - [`SynchronizedCache`] publishes every `set`/`clear`/`clear_all`
//! - [`InvalidationSynchronizer`] applies events from other processes to the
//!   local tier only, and ignores events carrying its own origin

pub mod channel;
pub mod event;
pub mod synchronizer;

pub use channel::{EventHandler, LocalNotificationChannel, NotificationChannel, SubscriptionHandle};
pub use event::{topic_for, InvalidationEvent, InvalidationReason};
pub use synchronizer::{InvalidationSynchronizer, SyncState, SyncStats, SynchronizedCache};
