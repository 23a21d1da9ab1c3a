//! Outbox rows: change events waiting to be published.

use chrono::{DateTime, Utc};
use event_bus::{ChangeEvent, OutgoingMessage, Topic};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Monotonic identifier of an outbox row; publish order follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(i64);

impl OutboxId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for OutboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change event committed together with a ledger write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub topic: Topic,
    /// Partition key; always the item ID.
    pub key: String,
    pub payload: serde_json::Value,
    /// Failed publish attempts so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Converts the row into the message published on the bus.
    pub fn to_message(&self) -> OutgoingMessage {
        OutgoingMessage::keyed(self.topic, self.key.clone(), self.payload.clone())
    }
}

/// An outbox row before it has been assigned an ID.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewOutboxEntry {
    pub topic: Topic,
    pub key: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEntry {
    pub fn from_event(event: &ChangeEvent) -> Result<Self> {
        let message = event.to_message()?;
        Ok(Self {
            topic: message.topic,
            key: event.item_id().to_string(),
            payload: message.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ItemId, UserId};

    #[test]
    fn test_new_entry_is_keyed_by_item() {
        let event = ChangeEvent::item_delete(ItemId::new("I9"), UserId::new(3));
        let entry = NewOutboxEntry::from_event(&event).unwrap();
        assert_eq!(entry.topic, Topic::ItemDeletes);
        assert_eq!(entry.key, "I9");
        assert_eq!(entry.payload["event_type"], "item_delete");
    }

    #[test]
    fn test_to_message() {
        let entry = OutboxEntry {
            id: OutboxId::new(1),
            topic: Topic::StockUpdates,
            key: "I1".to_string(),
            payload: serde_json::json!({"new_stock": 3}),
            attempts: 2,
            last_error: Some("broker down".to_string()),
            created_at: Utc::now(),
        };
        let message = entry.to_message();
        assert_eq!(message.topic, Topic::StockUpdates);
        assert_eq!(message.key.as_deref(), Some("I1"));
        assert_eq!(message.payload["new_stock"], 3);
    }
}
