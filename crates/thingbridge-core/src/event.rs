/*!
 * Event system for thingbridge.
 *
 * This module provides the typed publish/subscribe channels used to fan
 * out device-found, device-lost, and pulled-update notifications.
 * Subscribing hands back a receiver; dropping the receiver is the
 * unsubscribe. Each published event is delivered at most once to each
 * receiver that was subscribed when it was published.
 */
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Maximum number of events that can be buffered in a channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

type EventSender<T> = broadcast::Sender<T>;
type EventReceiver<T> = broadcast::Receiver<T>;

/// Event bus for publishing and subscribing to events
#[derive(Debug)]
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Create a new event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            channel_capacity: capacity,
        }
    }

    /// Publish an event, returning the number of receivers it reached
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        let sender = self.sender::<T>()?;

        let receivers = sender.receiver_count();
        if receivers > 0 {
            match sender.send(event) {
                Ok(n) => {
                    trace!("Published event to {} receivers", n);
                    Ok(n)
                }
                Err(e) => {
                    warn!("Failed to publish event: {}", e);
                    Err(Error::event(format!("Failed to publish event: {}", e)))
                }
            }
        } else {
            debug!("No receivers for event");
            Ok(0)
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        Ok(self.sender::<T>()?.subscribe())
    }

    /// Get or create the channel for an event type
    fn sender<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventSender<T>> {
        let type_id = TypeId::of::<T>();
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| Error::event("Failed to lock channels"))?;

        if let Some(sender) = channels.get(&type_id) {
            Ok(sender
                .downcast_ref::<EventSender<T>>()
                .ok_or_else(|| Error::event("Failed to downcast sender"))?
                .clone())
        } else {
            let (sender, _) = broadcast::channel(self.channel_capacity);
            channels.insert(type_id, Box::new(sender.clone()));
            Ok(sender)
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared event bus that can be cloned
#[derive(Debug, Clone)]
pub struct SharedEventBus(Arc<EventBus>);

impl SharedEventBus {
    /// Create a new shared event bus
    pub fn new() -> Self {
        Self(Arc::new(EventBus::new()))
    }

    /// Create a new shared event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Publish an event
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        self.0.publish(event)
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        self.0.subscribe()
    }
}

impl Default for SharedEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestEvent {
        id: u32,
        message: String,
    }

    #[test_log::test(tokio::test)]
    async fn test_publish_subscribe() -> Result<()> {
        let event_bus = EventBus::new();
        let mut rx = event_bus.subscribe::<TestEvent>()?;

        let event = TestEvent {
            id: 1,
            message: "device found".to_string(),
        };

        let receivers = event_bus.publish(event.clone())?;
        assert_eq!(receivers, 1);

        let received = rx.recv().await.map_err(|e| Error::event(e.to_string()))?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.message, event.message);

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_subscribers() -> Result<()> {
        let event_bus = SharedEventBus::new();
        let mut rx1 = event_bus.subscribe::<TestEvent>()?;
        let mut rx2 = event_bus.subscribe::<TestEvent>()?;

        let event = TestEvent {
            id: 2,
            message: "device lost".to_string(),
        };

        let receivers = event_bus.publish(event.clone())?;
        assert_eq!(receivers, 2);

        let received1 = rx1.recv().await.map_err(|e| Error::event(e.to_string()))?;
        let received2 = rx2.recv().await.map_err(|e| Error::event(e.to_string()))?;

        assert_eq!(received1.id, event.id);
        assert_eq!(received2.id, event.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_event_types() -> Result<()> {
        #[derive(Debug, Clone)]
        struct OtherEvent {
            value: String,
        }

        let event_bus = EventBus::new();
        let mut rx1 = event_bus.subscribe::<TestEvent>()?;
        let mut rx2 = event_bus.subscribe::<OtherEvent>()?;

        let test_event = TestEvent {
            id: 3,
            message: "state changed".to_string(),
        };
        let other_event = OtherEvent {
            value: "subscription failed".to_string(),
        };

        event_bus.publish(test_event.clone())?;
        event_bus.publish(other_event.clone())?;

        // Each subscriber receives only its event type
        let received1 = rx1.recv().await.map_err(|e| Error::event(e.to_string()))?;
        let received2 = rx2.recv().await.map_err(|e| Error::event(e.to_string()))?;

        assert_eq!(received1.id, test_event.id);
        assert_eq!(received2.value, other_event.value);

        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() -> Result<()> {
        let event_bus = EventBus::new();
        let rx = event_bus.subscribe::<TestEvent>()?;
        drop(rx);

        let receivers = event_bus.publish(TestEvent {
            id: 4,
            message: "nobody listening".to_string(),
        })?;
        assert_eq!(receivers, 0);

        Ok(())
    }
}
