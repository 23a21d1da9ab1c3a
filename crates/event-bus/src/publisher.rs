//! Change event publishing with logging and metrics.

use crate::{ChangeEvent, Delivery, EventBus, OutgoingMessage, Result};

/// Publishes change events to a bus, keyed by item ID.
#[derive(Debug, Clone)]
pub struct EventPublisher<B: EventBus> {
    bus: B,
}

impl<B: EventBus> EventPublisher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Returns a reference to the underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Serializes and publishes a change event.
    pub async fn publish(&self, event: &ChangeEvent) -> Result<Delivery> {
        let message = event.to_message()?;
        self.publish_message(message).await
    }

    /// Publishes an already-encoded message (e.g. one read back from the outbox).
    #[tracing::instrument(skip(self, message), fields(topic = %message.topic, key = ?message.key))]
    pub async fn publish_message(&self, message: OutgoingMessage) -> Result<Delivery> {
        let topic = message.topic;
        match self.bus.publish(message).await {
            Ok(delivery) => {
                metrics::counter!("bus_messages_published_total", "topic" => topic.as_str())
                    .increment(1);
                tracing::debug!(
                    partition = delivery.partition,
                    offset = %delivery.offset,
                    "message published"
                );
                Ok(delivery)
            }
            Err(e) => {
                metrics::counter!("bus_publish_failures_total", "topic" => topic.as_str())
                    .increment(1);
                tracing::warn!(error = %e, "publish failed");
                Err(e)
            }
        }
    }
}
