use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    BusError, BusMessage, Delivery, Offset, OutgoingMessage, Result, Topic,
    bus::{EventBus, validate_partition},
    topic::partition_for,
};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 3;

#[derive(Debug, Default)]
struct InMemoryBusState {
    logs: HashMap<(Topic, u32), Vec<BusMessage>>,
    committed: HashMap<(String, Topic, u32), Offset>,
}

/// In-memory event bus implementation for testing and single-process runs.
///
/// Behaves like the PostgreSQL implementation: per-partition offsets,
/// per-group committed positions, key-based partitioning.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    partitions: u32,
    state: Arc<RwLock<InMemoryBusState>>,
    fail_on_publish: Arc<AtomicBool>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }
}

impl InMemoryEventBus {
    /// Creates a bus with [`DEFAULT_PARTITIONS`] partitions per topic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with the given number of partitions per topic (at least one).
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            state: Arc::new(RwLock::new(InMemoryBusState::default())),
            fail_on_publish: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every publish fail until switched off again.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Returns every message on `topic`, ordered by partition then offset.
    pub async fn messages(&self, topic: Topic) -> Vec<BusMessage> {
        let state = self.state.read().await;
        (0..self.partitions)
            .filter_map(|p| state.logs.get(&(topic, p)))
            .flat_map(|log| log.iter().cloned())
            .collect()
    }

    /// Returns the total number of messages stored across all topics.
    pub async fn message_count(&self) -> usize {
        self.state.read().await.logs.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<Delivery> {
        if self.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("broker not reachable".to_string()));
        }

        let partition = partition_for(message.key.as_deref(), self.partitions);
        let mut state = self.state.write().await;
        let log = state.logs.entry((message.topic, partition)).or_default();
        let offset = Offset::new(log.len() as i64);

        log.push(BusMessage {
            topic: message.topic,
            partition,
            offset,
            key: message.key,
            payload: message.payload,
            published_at: Utc::now(),
        });

        Ok(Delivery { partition, offset })
    }

    async fn poll(
        &self,
        group: &str,
        topic: Topic,
        partition: u32,
        max: usize,
    ) -> Result<Vec<BusMessage>> {
        validate_partition(topic, partition, self.partitions)?;

        let state = self.state.read().await;
        let from = state
            .committed
            .get(&(group.to_string(), topic, partition))
            .copied()
            .unwrap_or_default();

        let messages = state
            .logs
            .get(&(topic, partition))
            .map(|log| {
                log.iter()
                    .skip(from.as_i64().max(0) as usize)
                    .take(max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn commit(&self, group: &str, topic: Topic, partition: u32, next: Offset) -> Result<()> {
        validate_partition(topic, partition, self.partitions)?;

        let mut state = self.state.write().await;
        state
            .committed
            .insert((group.to_string(), topic, partition), next);
        Ok(())
    }

    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Offset> {
        validate_partition(topic, partition, self.partitions)?;

        let state = self.state.read().await;
        Ok(state
            .committed
            .get(&(group.to_string(), topic, partition))
            .copied()
            .unwrap_or_default())
    }

    async fn end_offset(&self, topic: Topic, partition: u32) -> Result<Offset> {
        validate_partition(topic, partition, self.partitions)?;

        let state = self.state.read().await;
        let len = state.logs.get(&(topic, partition)).map_or(0, Vec::len);
        Ok(Offset::new(len as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBusExt;

    fn msg(key: &str, n: i64) -> OutgoingMessage {
        OutgoingMessage::keyed(Topic::StockUpdates, key, serde_json::json!({ "n": n }))
    }

    #[tokio::test]
    async fn test_publish_assigns_sequential_offsets_per_partition() {
        let bus = InMemoryEventBus::with_partitions(4);

        let d1 = bus.publish(msg("I1", 1)).await.unwrap();
        let d2 = bus.publish(msg("I1", 2)).await.unwrap();

        assert_eq!(d1.partition, d2.partition);
        assert_eq!(d1.offset, Offset::new(0));
        assert_eq!(d2.offset, Offset::new(1));
        assert_eq!(bus.message_count().await, 2);
    }

    #[tokio::test]
    async fn test_poll_does_not_advance_without_commit() {
        let bus = InMemoryEventBus::with_partitions(1);
        bus.publish(msg("I1", 1)).await.unwrap();

        let first = bus.poll("g", Topic::StockUpdates, 0, 10).await.unwrap();
        let second = bus.poll("g", Topic::StockUpdates, 0, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);

        bus.commit("g", Topic::StockUpdates, 0, first[0].offset.next())
            .await
            .unwrap();
        let third = bus.poll("g", Topic::StockUpdates, 0, 10).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_groups_track_positions_independently() {
        let bus = InMemoryEventBus::with_partitions(1);
        bus.publish(msg("I1", 1)).await.unwrap();
        bus.commit("a", Topic::StockUpdates, 0, Offset::new(1))
            .await
            .unwrap();

        assert!(bus.poll("a", Topic::StockUpdates, 0, 10).await.unwrap().is_empty());
        assert_eq!(bus.poll("b", Topic::StockUpdates, 0, 10).await.unwrap().len(), 1);
        assert_eq!(bus.lag("b", Topic::StockUpdates, 0).await.unwrap(), 1);
        assert_eq!(bus.lag("a", Topic::StockUpdates, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_respects_max() {
        let bus = InMemoryEventBus::with_partitions(1);
        for n in 0..5 {
            bus.publish(msg("I1", n)).await.unwrap();
        }
        let batch = bus.poll("g", Topic::StockUpdates, 0, 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].offset, Offset::new(1));
    }

    #[tokio::test]
    async fn test_invalid_partition() {
        let bus = InMemoryEventBus::with_partitions(2);
        let result = bus.poll("g", Topic::StockUpdates, 2, 1).await;
        assert!(matches!(result, Err(BusError::InvalidPartition { partition: 2, .. })));
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_on_publish(true);
        assert!(matches!(
            bus.publish(msg("I1", 1)).await,
            Err(BusError::Unavailable(_))
        ));
        assert_eq!(bus.message_count().await, 0);

        bus.set_fail_on_publish(false);
        assert!(bus.publish(msg("I1", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_same_key_same_partition_across_topics() {
        let bus = InMemoryEventBus::with_partitions(8);
        let a = bus.publish(msg("item-x", 1)).await.unwrap();
        let b = bus
            .publish(OutgoingMessage::keyed(
                Topic::ItemDeletes,
                "item-x",
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(a.partition, b.partition);
    }
}
