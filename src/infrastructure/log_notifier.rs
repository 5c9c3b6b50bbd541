use crate::application::events::EventStream;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

/// Notifier that drains the event queue into the log. It stops once every
/// publisher has been dropped and returns how many events it saw.
pub fn spawn(mut events: EventStream) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut delivered = 0;
        while let Some(event) = events.recv().await {
            let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
            info!(
                event = event.name(),
                booking_id = %event.booking_id(),
                payload = %payload,
                "lifecycle event"
            );
            delivered += 1;
        }
        delivered
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventPublisher;
    use crate::domain::events::LifecycleEvent;
    use crate::domain::identity::BookingId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_notifier_drains_until_publishers_drop() {
        let (publisher, stream) = EventPublisher::channel();
        let handle = spawn(stream);
        for _ in 0..3 {
            publisher.publish(LifecycleEvent::SessionCompleted {
                booking_id: BookingId::generate(),
                at: Utc::now(),
            });
        }
        drop(publisher);
        assert_eq!(handle.await.unwrap(), 3);
    }
}
