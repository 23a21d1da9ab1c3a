use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::ItemId;
use event_bus::ChangeEvent;
use tokio::sync::RwLock;

use crate::{
    InventoryRecord, LedgerError, OutboxEntry, OutboxId, Result,
    ledger::{InventoryLedger, WriteOptions},
    outbox::NewOutboxEntry,
};

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    live: HashMap<ItemId, InventoryRecord>,
    tombstones: Vec<InventoryRecord>,
    outbox: BTreeMap<OutboxId, OutboxEntry>,
    next_outbox_id: i64,
}

impl InMemoryLedgerState {
    fn enqueue(&mut self, options: &WriteOptions) -> Result<()> {
        let Some(event) = &options.event else {
            return Ok(());
        };
        let entry = NewOutboxEntry::from_event(event)?;
        self.next_outbox_id += 1;
        let id = OutboxId::new(self.next_outbox_id);
        self.outbox.insert(
            id,
            OutboxEntry {
                id,
                topic: entry.topic,
                key: entry.key,
                payload: entry.payload,
                attempts: 0,
                last_error: None,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }
}

/// In-memory ledger implementation for testing and single-process runs.
///
/// A single lock guards records and outbox, which gives the same atomicity
/// as the PostgreSQL transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<InMemoryLedgerState>>,
    fail_on_write: Arc<AtomicBool>,
    fail_on_read: Arc<AtomicBool>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every mutation fail until switched off again.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Makes every read fail until switched off again.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.fail_on_read.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of live records.
    pub async fn record_count(&self) -> usize {
        self.state.read().await.live.len()
    }

    /// Returns every tombstoned record, oldest first.
    pub async fn tombstones(&self) -> Vec<InventoryRecord> {
        self.state.read().await.tombstones.clone()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_on_read.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger read failed".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger write failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryLedger {
    async fn get(&self, item_id: &ItemId) -> Result<Option<InventoryRecord>> {
        self.check_read()?;
        Ok(self.state.read().await.live.get(item_id).cloned())
    }

    async fn list(&self) -> Result<Vec<InventoryRecord>> {
        self.check_read()?;
        let state = self.state.read().await;
        let mut records: Vec<_> = state.live.values().cloned().collect();
        records.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        Ok(records)
    }

    async fn create(
        &self,
        record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if state.live.contains_key(&record.item_id) {
            return Err(LedgerError::DuplicateRecord(record.item_id));
        }
        state.enqueue(&options)?;
        state.live.insert(record.item_id.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        mut record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(current) = state.live.get(&record.item_id) else {
            return Err(LedgerError::RecordNotFound(record.item_id));
        };
        record.created_at = current.created_at;
        record.updated_at = Utc::now();
        state.enqueue(&options)?;
        state.live.insert(record.item_id.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, item_id: &ItemId, options: WriteOptions) -> Result<()> {
        self.check_write()?;
        let mut state = self.state.write().await;
        if !state.live.contains_key(item_id) {
            return Err(LedgerError::RecordNotFound(item_id.clone()));
        }
        state.enqueue(&options)?;
        if let Some(mut record) = state.live.remove(item_id) {
            let now = Utc::now();
            record.deleted_at = Some(now);
            record.updated_at = now;
            state.tombstones.push(record);
        }
        Ok(())
    }

    async fn reconcile_stock(&self, item_id: &ItemId, observed: i32) -> Result<Option<i32>> {
        self.check_write()?;
        let mut state = self.state.write().await;
        let Some(record) = state.live.get(item_id) else {
            return Ok(None);
        };
        if record.stock == observed {
            return Ok(None);
        }
        let stock = record.stock;
        let event = ChangeEvent::stock_update(item_id.clone(), stock, record.updated_by);
        state.enqueue(&WriteOptions::with_event(event))?;
        Ok(Some(stock))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        self.check_read()?;
        let state = self.state.read().await;
        Ok(state.outbox.values().take(limit).cloned().collect())
    }

    async fn mark_published(&self, id: OutboxId) -> Result<()> {
        self.check_write()?;
        self.state.write().await.outbox.remove(&id);
        Ok(())
    }

    async fn record_publish_failure(&self, id: OutboxId, error: &str) -> Result<()> {
        self.check_write()?;
        if let Some(entry) = self.state.write().await.outbox.get_mut(&id) {
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InventoryLedgerExt;
    use common::UserId;
    use event_bus::Topic;

    fn record(item: &str, stock: i32) -> InventoryRecord {
        InventoryRecord::new(ItemId::new(item), stock, UserId::new(42))
    }

    fn stock_event(item: &str, stock: i32) -> WriteOptions {
        WriteOptions::with_event(ChangeEvent::stock_update(
            ItemId::new(item),
            stock,
            UserId::new(42),
        ))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let ledger = InMemoryLedger::new();
        ledger
            .create(record("I1", 5), WriteOptions::new())
            .await
            .unwrap();

        let loaded = ledger.get_required(&ItemId::new("I1")).await.unwrap();
        assert_eq!(loaded.stock, 5);
        assert!(ledger.exists(&ItemId::new("I1")).await.unwrap());
        assert!(!ledger.exists(&ItemId::new("I2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_duplicate_live_record() {
        let ledger = InMemoryLedger::new();
        ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();
        let result = ledger.create(record("I1", 6), WriteOptions::new()).await;
        assert!(matches!(result, Err(LedgerError::DuplicateRecord(_))));
    }

    #[tokio::test]
    async fn test_update_keeps_created_at() {
        let ledger = InMemoryLedger::new();
        let created = ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();

        let mut changed = created.clone();
        changed.set_stock(10, UserId::new(7));
        let updated = ledger.update(changed, WriteOptions::new()).await.unwrap();

        assert_eq!(updated.stock, 10);
        assert_eq!(updated.updated_by, UserId::new(7));
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let ledger = InMemoryLedger::new();
        let result = ledger.update(record("I1", 5), WriteOptions::new()).await;
        assert!(matches!(result, Err(LedgerError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_tombstones_and_allows_recreate() {
        let ledger = InMemoryLedger::new();
        ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();
        ledger
            .delete(&ItemId::new("I1"), WriteOptions::new())
            .await
            .unwrap();

        assert!(!ledger.exists(&ItemId::new("I1")).await.unwrap());
        assert!(ledger.list().await.unwrap().is_empty());
        assert!(ledger.tombstones().await[0].is_deleted());

        ledger.create(record("I1", 1), WriteOptions::new()).await.unwrap();
        assert_eq!(ledger.record_count().await, 1);

        let missing = ledger.delete(&ItemId::new("I2"), WriteOptions::new()).await;
        assert!(matches!(missing, Err(LedgerError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_ordered_by_item_id() {
        let ledger = InMemoryLedger::new();
        for item in ["b", "c", "a"] {
            ledger.create(record(item, 1), WriteOptions::new()).await.unwrap();
        }
        let ids: Vec<_> = ledger
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.item_id.to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_write_enqueues_outbox_in_order() {
        let ledger = InMemoryLedger::new();
        ledger.create(record("I1", 5), stock_event("I1", 5)).await.unwrap();
        ledger
            .delete(
                &ItemId::new("I1"),
                WriteOptions::with_event(ChangeEvent::item_delete(
                    ItemId::new("I1"),
                    UserId::new(42),
                )),
            )
            .await
            .unwrap();

        let pending = ledger.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].id < pending[1].id);
        assert_eq!(pending[0].topic, Topic::StockUpdates);
        assert_eq!(pending[1].topic, Topic::ItemDeletes);
        assert_eq!(pending[1].key, "I1");
        assert_eq!(ledger.outbox_depth(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_stock_enqueues_only_when_moved() {
        let ledger = InMemoryLedger::new();
        let item = ItemId::new("I1");
        ledger.create(record("I1", 20), stock_event("I1", 20)).await.unwrap();

        assert_eq!(ledger.reconcile_stock(&item, 20).await.unwrap(), None);
        assert_eq!(ledger.outbox_depth(10).await.unwrap(), 1);

        assert_eq!(ledger.reconcile_stock(&item, 10).await.unwrap(), Some(20));
        let pending = ledger.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].key, "I1");
        assert_eq!(pending[1].payload["new_stock"], 20);
        assert_eq!(pending[1].payload["user_id"], 42);

        ledger.delete(&item, WriteOptions::new()).await.unwrap();
        assert_eq!(ledger.reconcile_stock(&item, 10).await.unwrap(), None);
        assert_eq!(ledger.outbox_depth(10).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_outbox_row() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_on_write(true);
        let result = ledger.create(record("I1", 5), stock_event("I1", 5)).await;
        assert!(matches!(result, Err(LedgerError::Unavailable(_))));

        ledger.set_fail_on_write(false);
        assert!(ledger.pending_outbox(10).await.unwrap().is_empty());
        assert_eq!(ledger.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_no_outbox_row() {
        let ledger = InMemoryLedger::new();
        let result = ledger.update(record("I1", 5), stock_event("I1", 5)).await;
        assert!(result.is_err());
        assert!(ledger.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_bookkeeping() {
        let ledger = InMemoryLedger::new();
        ledger.create(record("I1", 5), stock_event("I1", 5)).await.unwrap();
        let id = ledger.pending_outbox(1).await.unwrap()[0].id;

        ledger.record_publish_failure(id, "broker down").await.unwrap();
        let entry = &ledger.pending_outbox(1).await.unwrap()[0];
        assert_eq!(entry.attempts, 1);
        assert_eq!(entry.last_error.as_deref(), Some("broker down"));

        ledger.mark_published(id).await.unwrap();
        assert!(ledger.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_read() {
        let ledger = InMemoryLedger::new();
        ledger.set_fail_on_read(true);
        assert!(ledger.get(&ItemId::new("I1")).await.is_err());
        assert!(ledger.list().await.is_err());
    }
}
