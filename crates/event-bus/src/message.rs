use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Topic;

/// Position of a message within a partition.
///
/// Offsets start at 0 for the first message of a partition and increment by
/// one per message. A consumer's committed offset is the offset of the next
/// message it wants to read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(i64);

impl Offset {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the offset of the first message in a partition.
    pub fn earliest() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// A message to be published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Destination topic.
    pub topic: Topic,
    /// Partitioning key; messages with the same key keep their relative order.
    pub key: Option<String>,
    /// JSON payload.
    pub payload: serde_json::Value,
}

impl OutgoingMessage {
    pub fn new(topic: Topic, key: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            topic,
            key,
            payload,
        }
    }

    /// Creates a keyed message.
    pub fn keyed(topic: Topic, key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(topic, Some(key.into()), payload)
    }
}

/// Where a published message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: u32,
    pub offset: Offset,
}

/// A message as stored in, and delivered by, the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: Topic,
    pub partition: u32,
    pub offset: Offset,
    pub key: Option<String>,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_ordering() {
        let o = Offset::earliest();
        assert_eq!(o.as_i64(), 0);
        assert!(o < o.next());
        assert_eq!(o.next(), Offset::new(1));
    }

    #[test]
    fn test_keyed_message_carries_key() {
        let msg = OutgoingMessage::keyed(Topic::StockUpdates, "I1", serde_json::json!({}));
        assert_eq!(msg.key.as_deref(), Some("I1"));
        assert_eq!(msg.topic, Topic::StockUpdates);
    }
}
