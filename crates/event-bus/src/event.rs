//! Change events exchanged between the inventory and catalog services.
//!
//! Wire format (JSON):
//!
//! ```text
//! stock_updates: {"event_type":"stock_update","item_id":"..","new_stock":10,"user_id":42}
//! item_deletes:  {"event_type":"item_delete","item_id":"..","user_id":42}
//! ```

use common::{ItemId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OutgoingMessage, Topic};

/// Sets a catalog item's stock to an absolute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdateEvent {
    pub item_id: ItemId,
    pub new_stock: i32,
    pub user_id: UserId,
}

/// Removes a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleteEvent {
    pub item_id: ItemId,
    pub user_id: UserId,
}

/// A change committed by the inventory service that the catalog must reflect.
///
/// Events carry no version: consumers rely on per-key partition ordering
/// and on every change being an absolute, idempotent assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ChangeEvent {
    StockUpdate(StockUpdateEvent),
    ItemDelete(ItemDeleteEvent),
}

/// Reasons a payload cannot be turned back into a [`ChangeEvent`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Malformed change event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Event type {event_type} does not belong on topic {topic}")]
    TopicMismatch { topic: Topic, event_type: &'static str },

    #[error("Topic {0} does not carry change events")]
    NotAChangeTopic(Topic),

    #[error("Negative stock {0} in stock update")]
    NegativeStock(i32),
}

impl ChangeEvent {
    pub fn stock_update(item_id: ItemId, new_stock: i32, user_id: UserId) -> Self {
        ChangeEvent::StockUpdate(StockUpdateEvent {
            item_id,
            new_stock,
            user_id,
        })
    }

    pub fn item_delete(item_id: ItemId, user_id: UserId) -> Self {
        ChangeEvent::ItemDelete(ItemDeleteEvent { item_id, user_id })
    }

    /// Returns the wire `event_type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::StockUpdate(_) => "stock_update",
            ChangeEvent::ItemDelete(_) => "item_delete",
        }
    }

    /// Returns the topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::StockUpdate(_) => Topic::StockUpdates,
            ChangeEvent::ItemDelete(_) => Topic::ItemDeletes,
        }
    }

    pub fn item_id(&self) -> &ItemId {
        match self {
            ChangeEvent::StockUpdate(e) => &e.item_id,
            ChangeEvent::ItemDelete(e) => &e.item_id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            ChangeEvent::StockUpdate(e) => e.user_id,
            ChangeEvent::ItemDelete(e) => e.user_id,
        }
    }

    /// Builds the outgoing message, keyed by item ID.
    pub fn to_message(&self) -> Result<OutgoingMessage, serde_json::Error> {
        Ok(OutgoingMessage::keyed(
            self.topic(),
            self.item_id().as_str(),
            serde_json::to_value(self)?,
        ))
    }

    /// Decodes a payload received on `topic`.
    pub fn decode(topic: Topic, payload: &serde_json::Value) -> Result<Self, EventDecodeError> {
        if !Topic::CHANGE_TOPICS.contains(&topic) {
            return Err(EventDecodeError::NotAChangeTopic(topic));
        }

        let event: ChangeEvent = serde_json::from_value(payload.clone())?;
        if event.topic() != topic {
            return Err(EventDecodeError::TopicMismatch {
                topic,
                event_type: event.event_type(),
            });
        }
        if let ChangeEvent::StockUpdate(ref e) = event
            && e.new_stock < 0
        {
            return Err(EventDecodeError::NegativeStock(e.new_stock));
        }

        Ok(event)
    }
}
