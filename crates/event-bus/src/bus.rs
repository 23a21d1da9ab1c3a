use async_trait::async_trait;

use crate::{BusError, BusMessage, Delivery, Offset, OutgoingMessage, Result, Topic};

/// Core trait for event bus implementations.
///
/// The bus is an append-only log split into a fixed number of partitions per
/// topic. Delivery is at-least-once: consumers read from their committed
/// offset and only advance it with [`EventBus::commit`], so anything read
/// but not committed is delivered again. Ordering holds within a partition
/// only. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Returns the number of partitions each topic has.
    fn partitions(&self) -> u32;

    /// Appends a message, choosing the partition from its key.
    ///
    /// Returns once the message is durably stored; the returned delivery is
    /// the acknowledgement.
    async fn publish(&self, message: OutgoingMessage) -> Result<Delivery>;

    /// Reads up to `max` messages from `partition`, starting at the group's
    /// committed offset. Does not move the committed offset.
    async fn poll(
        &self,
        group: &str,
        topic: Topic,
        partition: u32,
        max: usize,
    ) -> Result<Vec<BusMessage>>;

    /// Sets the group's committed offset for a partition. `next` is the offset
    /// of the next message the group wants delivered.
    async fn commit(&self, group: &str, topic: Topic, partition: u32, next: Offset) -> Result<()>;

    /// Returns the group's committed offset for a partition
    /// ([`Offset::earliest`] if it never committed).
    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Offset>;

    /// Returns the offset the next published message in the partition will get.
    async fn end_offset(&self, topic: Topic, partition: u32) -> Result<Offset>;
}

/// Extension trait providing convenience methods for event buses.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Returns how many messages of a partition the group has not committed yet.
    async fn lag(&self, group: &str, topic: Topic, partition: u32) -> Result<i64> {
        let end = self.end_offset(topic, partition).await?;
        let committed = self.committed(group, topic, partition).await?;
        Ok((end.as_i64() - committed.as_i64()).max(0))
    }

    /// Returns the group's total lag over every partition of `topics`.
    async fn total_lag(&self, group: &str, topics: &[Topic]) -> Result<i64> {
        let mut total = 0;
        for topic in topics {
            for partition in 0..self.partitions() {
                total += self.lag(group, *topic, partition).await?;
            }
        }
        Ok(total)
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}

/// Checks that `partition` exists on a bus with `partitions` partitions.
pub fn validate_partition(topic: Topic, partition: u32, partitions: u32) -> Result<()> {
    if partition >= partitions {
        return Err(BusError::InvalidPartition {
            topic: topic.to_string(),
            partition,
            partitions,
        });
    }
    Ok(())
}
