//! Partitioned, at-least-once event bus for inventory change events.
//!
//! Messages keyed by item ID always land on the same partition, so every
//! change to one item is consumed in publish order.

pub mod bus;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod publisher;
pub mod topic;

pub use bus::{EventBus, EventBusExt};
pub use common::{ItemId, UserId};
pub use consumer::{ChangeHandler, ConsumerConfig, EventConsumer, HandlerError, PollOutcome};
pub use dead_letter::{BusDeadLetterSink, DeadLetter, DeadLetterSink, InMemoryDeadLetterSink};
pub use error::{BusError, Result};
pub use event::{ChangeEvent, EventDecodeError, ItemDeleteEvent, StockUpdateEvent};
pub use memory::{DEFAULT_PARTITIONS, InMemoryEventBus};
pub use message::{BusMessage, Delivery, Offset, OutgoingMessage};
pub use postgres::PostgresEventBus;
pub use publisher::EventPublisher;
pub use topic::{Topic, partition_for};
