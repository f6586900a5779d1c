use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking events, one channel per customer. The
/// notification collaborator subscribes here; delivery (email, SMS) stays
/// outside the engine.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
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

    /// Subscribe to a customer's booking events. Creates the channel if needed.
    pub fn subscribe(&self, customer_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(customer_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, customer_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&customer_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a customer's channel.
    #[allow(dead_code)]
    pub fn remove(&self, customer_id: &Ulid) {
        self.channels.remove(customer_id);
    }
}
