use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, PropertyId};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Receiver of committed calendar events (mailer, webhook, live feed).
///
/// Delivery is best effort: the engine logs a failure and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, property_id: PropertyId, event: &Event) -> Result<(), NotifyError>;
}

/// In-process broadcast hub, one channel per property.
pub struct NotifyHub {
    channels: DashMap<PropertyId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a property's events, creating its channel on first use.
    pub fn subscribe(&self, property_id: PropertyId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(property_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan out to current subscribers. No-op if nobody is listening.
    pub fn send(&self, property_id: PropertyId, event: &Event) {
        if let Some(sender) = self.channels.get(&property_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose last subscriber went away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn notify(&self, property_id: PropertyId, event: &Event) -> Result<(), NotifyError> {
        self.send(property_id, event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn unblocked(property_id: PropertyId) -> Event {
        Event::RangeUnblocked {
            id: Ulid::new(),
            property_id,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        let event = unblocked(pid);
        hub.notify(pid, &event).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_property_not_delivered() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        hub.send(Ulid::new(), &unblocked(Ulid::new()));
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        hub.send(pid, &unblocked(pid));
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let kept = hub.subscribe(Ulid::new());
        drop(hub.subscribe(Ulid::new()));
        assert_eq!(hub.channel_count(), 2);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
        drop(kept);
    }
}
