//! Event Bus - named in-process pub/sub channels
//!
//! Each EventBus keeps an ordered list of subscribers and relays every
//! published event to all of them, in subscription order, before `publish`
//! returns. Buses hold no history: a subscriber only sees events published
//! after it subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::types::LabelEvent;

/// Well-known bus names
pub mod names {
    /// API intents
    pub const API: &str = "api";
    /// Completed edits for image consumers
    pub const IMAGE: &str = "image";
    /// Raw data display announcements
    pub const RAW: &str = "raw";
    /// Selection announcements
    pub const SELECTED_CELLS: &str = "selectedCells";
    /// Pointer gestures from the canvas
    pub const CANVAS: &str = "canvas";
    /// Label set updates from the labeled image
    pub const LABELED: &str = "labeled";
}

/// Identifier of one subscription on a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<LabelEvent>,
}

/// A named publish/subscribe channel
pub struct EventBus {
    name: String,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a new bus with the given name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "EventBus::new: creating event bus");
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Name of this bus
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // Subscribers are plain senders, a poisoned lock leaves them consistent
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event to every current subscriber
    ///
    /// Returns the number of subscribers the event was delivered to.
    /// Subscribers whose receiving side was dropped are pruned.
    pub fn publish(&self, event: LabelEvent) -> usize {
        debug!(bus = %self.name, event_type = event.event_type(), "EventBus::publish");
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Subscribe to receive events
    ///
    /// Events published before this call are not received.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe_with(tx);
        Subscription {
            id,
            bus: self.name.clone(),
            rx,
        }
    }

    /// Deliver events into an existing channel
    ///
    /// Several buses may share one sender; the receiver then sees their
    /// events in the order they were published.
    pub fn subscribe_with(&self, tx: mpsc::UnboundedSender<LabelEvent>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscriber { id, tx });
        debug!(bus = %self.name, id = id.0, "EventBus::subscribe: new subscriber");
        id
    }

    /// Stop delivery to a subscription
    ///
    /// Returns false if the subscription was not registered on this bus.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        debug!(bus = %self.name, id = id.0, removed, "EventBus::unsubscribe");
        removed
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|s| !s.tx.is_closed()).count()
    }
}

/// Receiving side of a bus subscription
pub struct Subscription {
    id: SubscriptionId,
    bus: String,
    rx: mpsc::UnboundedReceiver<LabelEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the bus this subscription listens to
    pub fn bus(&self) -> &str {
        &self.bus
    }

    /// Wait for the next event; None once unsubscribed
    pub async fn recv(&mut self) -> Option<LabelEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<LabelEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued event
    pub fn drain(&mut self) -> Vec<LabelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Turn the subscription into a stream of `(bus name, event)` pairs
    pub fn into_stream(self) -> impl Stream<Item = (String, LabelEvent)> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some(((sub.bus.clone(), event), sub))
        })
    }
}

/// Registry of named buses for one editor session
///
/// Constructed once at startup and passed by reference to every component
/// that publishes or subscribes.
#[derive(Default)]
pub struct BusRegistry {
    buses: Mutex<HashMap<String, Arc<EventBus>>>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bus with the given name, creating it on first use
    pub fn bus(&self, name: &str) -> Arc<EventBus> {
        let mut buses = self.buses.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buses
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(EventBus::new(name)))
            .clone()
    }

    /// Publish on a named bus
    pub fn publish(&self, name: &str, event: LabelEvent) -> usize {
        self.bus(name).publish(event)
    }

    /// Subscribe to a named bus
    pub fn subscribe(&self, name: &str) -> Subscription {
        self.bus(name).subscribe()
    }

    /// Subscribe to several buses through one queue
    ///
    /// Events arrive in publish order across all of the buses. The
    /// subscription reports the joined bus names, e.g. `canvas+labeled`,
    /// and carries the id it holds on the first bus.
    pub fn subscribe_many(&self, names: &[&str]) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let ids: Vec<SubscriptionId> = names
            .iter()
            .map(|name| self.bus(name).subscribe_with(tx.clone()))
            .collect();
        Subscription {
            id: ids.first().copied().unwrap_or(SubscriptionId(0)),
            bus: names.join("+"),
            rx,
        }
    }

    /// Names of all buses created so far
    pub fn names(&self) -> Vec<String> {
        let buses = self.buses.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = buses.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Pipe every event of a subscription into an actor mailbox
///
/// The task ends when the bus side is dropped or the mailbox is closed.
pub fn forward<T>(mut subscription: Subscription, target: mpsc::Sender<T>) -> JoinHandle<()>
where
    T: From<LabelEvent> + Send + 'static,
{
    tokio::spawn(async move {
        debug!(bus = %subscription.bus(), "forward: started");
        while let Some(event) = subscription.recv().await {
            if target.send(T::from(event)).await.is_err() {
                debug!(bus = %subscription.bus(), "forward: target closed");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LabelSet;

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new("raw");
        assert_eq!(bus.name(), "raw");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new("raw");
        let _rx1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let bus = EventBus::new("selectedCells");
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(LabelEvent::Foreground { foreground: 3 }), 2);
        assert_eq!(bus.publish(LabelEvent::Selected { selected: 3 }), 2);

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(
                rx.drain(),
                vec![LabelEvent::Foreground { foreground: 3 }, LabelEvent::Selected { selected: 3 }]
            );
        }
    }

    #[test]
    fn test_late_subscriber_misses_prior_events() {
        let bus = EventBus::new("raw");
        bus.publish(LabelEvent::Color);
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new("raw");
        let mut rx = bus.subscribe();
        assert!(bus.unsubscribe(rx.id()));
        assert!(!bus.unsubscribe(rx.id()));

        assert_eq!(bus.publish(LabelEvent::Grayscale), 0);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let bus = EventBus::new("raw");
        let rx = bus.subscribe();
        drop(rx);
        assert_eq!(bus.publish(LabelEvent::Grayscale), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_registry_buses_do_not_cross_deliver() {
        let registry = BusRegistry::new();
        let mut raw = registry.subscribe(names::RAW);
        let mut image = registry.subscribe(names::IMAGE);

        registry.publish(names::RAW, LabelEvent::Color);

        assert_eq!(raw.try_recv(), Some(LabelEvent::Color));
        assert!(image.try_recv().is_none());
        assert!(Arc::ptr_eq(&registry.bus(names::RAW), &registry.bus(names::RAW)));
        assert_eq!(registry.names(), vec!["image".to_string(), "raw".to_string()]);
    }

    #[test]
    fn test_subscribe_many_keeps_publish_order_across_buses() {
        let registry = BusRegistry::new();
        let mut merged = registry.subscribe_many(&[names::CANVAS, names::LABELED]);
        assert_eq!(merged.bus(), "canvas+labeled");

        registry.publish(names::LABELED, LabelEvent::Labels { labels: LabelSet::from_ids([1, 9]) });
        registry.publish(names::CANVAS, LabelEvent::NewForeground);
        registry.publish(names::LABELED, LabelEvent::Labels { labels: LabelSet::from_ids([2]) });
        registry.publish(names::RAW, LabelEvent::Color);

        assert_eq!(
            merged.drain(),
            vec![
                LabelEvent::Labels { labels: LabelSet::from_ids([1, 9]) },
                LabelEvent::NewForeground,
                LabelEvent::Labels { labels: LabelSet::from_ids([2]) },
            ]
        );
        assert_eq!(registry.bus(names::CANVAS).subscriber_count(), 1);
        assert_eq!(registry.bus(names::LABELED).subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_forward_into_mailbox() {
        let bus = EventBus::new("canvas");
        let (tx, mut rx) = mpsc::channel::<LabelEvent>(8);
        let task = forward(bus.subscribe(), tx);

        bus.publish(LabelEvent::Hovering { hovering: Some(7) });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, LabelEvent::Hovering { hovering: Some(7) });

        drop(rx);
        bus.publish(LabelEvent::ShiftClick { detail: 1 });
        task.await.unwrap();
    }
}
