use async_trait::async_trait;
use common::ItemId;
use event_bus::ChangeEvent;

use crate::{InventoryRecord, OutboxEntry, OutboxId, Result};

/// Options for ledger writes.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Change event committed to the outbox in the same transaction as the write.
    pub event: Option<ChangeEvent>,
}

impl WriteOptions {
    /// Creates options with no outbox event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options that enqueue `event` together with the write.
    pub fn with_event(event: ChangeEvent) -> Self {
        Self { event: Some(event) }
    }
}

/// Core trait for inventory ledger implementations.
///
/// Every mutation and its optional outbox event commit atomically: either
/// both are visible afterwards or neither is. Tombstoned records are never
/// returned. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Returns the live record for an item, if any.
    async fn get(&self, item_id: &ItemId) -> Result<Option<InventoryRecord>>;

    /// Returns every live record, ordered by item ID.
    async fn list(&self) -> Result<Vec<InventoryRecord>>;

    /// Inserts a new live record.
    ///
    /// Fails with `DuplicateRecord` if a live record already exists.
    async fn create(
        &self,
        record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord>;

    /// Persists the stock, bounds and last writer of an existing live record.
    ///
    /// Fails with `RecordNotFound` if the item has no live record.
    async fn update(
        &self,
        record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord>;

    /// Tombstones the live record of an item.
    ///
    /// Fails with `RecordNotFound` if the item has no live record.
    async fn delete(&self, item_id: &ItemId, options: WriteOptions) -> Result<()>;

    /// Re-announces the live stock of an item if it moved away from `observed`.
    ///
    /// Reads the live record and, in the same transaction, enqueues a stock
    /// event carrying its current stock when that differs from `observed`.
    /// Returns the enqueued stock, or `None` if the record still holds
    /// `observed` or is not live.
    async fn reconcile_stock(&self, item_id: &ItemId, observed: i32) -> Result<Option<i32>>;

    /// Returns up to `limit` unpublished outbox rows, oldest first.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Removes an outbox row once the bus acknowledged it.
    async fn mark_published(&self, id: OutboxId) -> Result<()>;

    /// Records a failed publish attempt on an outbox row.
    async fn record_publish_failure(&self, id: OutboxId, error: &str) -> Result<()>;

    /// Returns true if the item has a live record.
    async fn exists(&self, item_id: &ItemId) -> Result<bool> {
        Ok(self.get(item_id).await?.is_some())
    }
}

/// Extension trait providing convenience methods for ledgers.
#[async_trait]
pub trait InventoryLedgerExt: InventoryLedger {
    /// Returns the live record for an item or `RecordNotFound`.
    async fn get_required(&self, item_id: &ItemId) -> Result<InventoryRecord> {
        self.get(item_id)
            .await?
            .ok_or_else(|| crate::LedgerError::RecordNotFound(item_id.clone()))
    }

    /// Returns the number of unpublished outbox rows, up to `limit`.
    async fn outbox_depth(&self, limit: usize) -> Result<usize> {
        Ok(self.pending_outbox(limit).await?.len())
    }
}

// Blanket implementation for all InventoryLedger implementations
impl<T: InventoryLedger + ?Sized> InventoryLedgerExt for T {}
