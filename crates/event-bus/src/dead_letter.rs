//! Dead-letter sinks for messages a consumer gave up on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{BusError, BusMessage, EventBus, OutgoingMessage, Result, Topic};

/// A message that exhausted its retries (or could not be decoded at all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Consumer group that gave up.
    pub group: String,
    /// The original message, including its topic, partition and offset.
    pub message: BusMessage,
    /// Number of handling attempts made.
    pub attempts: u32,
    /// The last error seen.
    pub error: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        group: impl Into<String>,
        message: BusMessage,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            message,
            attempts,
            error: error.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Destination for dead letters.
///
/// A sink error means the letter was not stored; the consumer then keeps
/// the message uncommitted so it is not lost.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter) -> Result<()>;
}

/// Publishes dead letters to the `dead_letters` topic of a bus,
/// keyed like the original message.
#[derive(Debug, Clone)]
pub struct BusDeadLetterSink<B: EventBus> {
    bus: B,
}

impl<B: EventBus> BusDeadLetterSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<B: EventBus> DeadLetterSink for BusDeadLetterSink<B> {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        let key = letter.message.key.clone();
        let payload = serde_json::to_value(&letter)?;
        self.bus
            .publish(OutgoingMessage::new(Topic::DeadLetters, key, payload))
            .await?;
        Ok(())
    }
}

/// In-memory dead-letter sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeadLetterSink {
    letters: Arc<RwLock<Vec<DeadLetter>>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail until switched off again.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Returns the dead letters received so far.
    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn send(&self, letter: DeadLetter) -> Result<()> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("dead-letter sink down".to_string()));
        }
        self.letters.write().await.push(letter);
        Ok(())
    }
}
