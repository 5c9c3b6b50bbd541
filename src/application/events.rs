use crate::domain::events::LifecycleEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type EventStream = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Outbound side of the notifier queue. Publishing never blocks and never
/// fails the operation that produced the event.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: Option<mpsc::UnboundedSender<LifecycleEvent>>,
}

impl EventPublisher {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A publisher with no notifier attached; events are discarded.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: LifecycleEvent) {
        let Some(tx) = &self.tx else {
            debug!(event = event.name(), "no notifier attached; event discarded");
            return;
        };
        if let Err(err) = tx.send(event) {
            warn!(
                event = err.0.name(),
                booking_id = %err.0.booking_id(),
                "notifier queue closed; event dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::BookingId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_published_events_are_received_in_order() {
        let (publisher, mut stream) = EventPublisher::channel();
        let first = BookingId::generate();
        let second = BookingId::generate();
        publisher.publish(LifecycleEvent::BookingDeclined {
            booking_id: first,
            at: Utc::now(),
        });
        publisher.publish(LifecycleEvent::SessionCompleted {
            booking_id: second,
            at: Utc::now(),
        });

        assert_eq!(stream.recv().await.unwrap().booking_id(), first);
        assert_eq!(stream.recv().await.unwrap().booking_id(), second);
    }

    #[test]
    fn test_publish_after_receiver_dropped_does_not_panic() {
        let (publisher, stream) = EventPublisher::channel();
        drop(stream);
        publisher.publish(LifecycleEvent::BookingDeclined {
            booking_id: BookingId::generate(),
            at: Utc::now(),
        });
        EventPublisher::disabled().publish(LifecycleEvent::BookingDeclined {
            booking_id: BookingId::generate(),
            at: Utc::now(),
        });
    }
}
