use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for real-time subscribers. The engine only depends on
/// [`NotifyHub::publish`]; fan-out to individual connections is the
/// subscriber's problem. Publication is fire-and-forget and never blocks
/// or fails the state transition that triggered it.
pub struct NotifyHub {
    tx: broadcast::Sender<Event>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all published events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn publish(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StationStatus;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();

        let event = Event::StationUpdated {
            station_id: Ulid::new(),
            status: StationStatus::Free,
            reason: None,
        };
        hub.publish(&event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        assert_eq!(hub.subscriber_count(), 0);
        // No subscriber — must not panic or block
        hub.publish(&Event::ReservationCancelled {
            reservation_id: Ulid::new(),
            station_id: Ulid::new(),
        });
    }
}
