use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{ChangeEvent, RoomId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-room change notifications. Presentation surfaces
/// (seat maps, record lists) subscribe to the rooms they display.
pub struct NotifyHub {
    channels: DashMap<RoomId, broadcast::Sender<ChangeEvent>>,
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

    /// Subscribe to change events for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<ChangeEvent> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, room_id: RoomId, event: &ChangeEvent) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a room's channel.
    #[allow(dead_code)]
    pub fn remove(&self, room_id: &RoomId) {
        self.channels.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReservationId;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = RoomId(3);
        let mut rx = hub.subscribe(rid);

        let event = ChangeEvent::SignedIn {
            id: ReservationId::new(),
        };
        hub.send(rid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.send(
            RoomId(9),
            &ChangeEvent::SignedIn {
                id: ReservationId::new(),
            },
        );
    }
}
