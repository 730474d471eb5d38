//! Event fan-out.
//!
//! The emitter is pure dispatch: it keeps a subscriber list and delivers
//! every emitted event to each subscriber in registration order. It filters
//! nothing and holds no other state. Mutating the subscriber list during a
//! dispatch affects the next emit, not the one in flight.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::ChangeEvent;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Creates a new random subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// The single capability a subscriber exposes.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Receives one change event.
    async fn deliver(&self, event: &ChangeEvent);
}

/// Adapts a plain closure into a subscriber.
struct FnSubscriber<F>(F);

#[async_trait]
impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    async fn deliver(&self, event: &ChangeEvent) {
        (self.0)(event);
    }
}

/// Broadcasts change events to subscribers in registration order.
#[derive(Default)]
pub struct EventEmitter {
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn EventSubscriber>)>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventEmitter {
    /// Creates an emitter with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber; returns the handle used to unsubscribe.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId::new();
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Registers a bare callable, adapting it to the subscriber capability.
    pub fn subscribe_fn<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber(listener)))
    }

    /// Removes a subscription. Returns whether the handle was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Delivers one event to every subscriber in registration order.
    ///
    /// Dispatch iterates a snapshot of the list taken at entry.
    pub async fn emit(&self, event: &ChangeEvent) {
        let snapshot: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();
        for subscriber in snapshot {
            subscriber.deliver(event).await;
        }
    }
}
