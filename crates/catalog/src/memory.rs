use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{ItemId, UserId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CatalogError, CatalogItem, NewCatalogItem, Result, store::CatalogStore};

/// In-memory catalog store for testing and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    items: Arc<RwLock<BTreeMap<ItemId, CatalogItem>>>,
    writes: Arc<AtomicU64>,
    fail_on_read: Arc<AtomicBool>,
    fail_on_write: Arc<AtomicBool>,
}

impl InMemoryCatalogStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item under its own ID, replacing any existing one.
    pub async fn insert(&self, item: CatalogItem) {
        self.items.write().await.insert(item.id.clone(), item);
    }

    /// Makes every read fail until switched off again.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.fail_on_read.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail until switched off again.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful mutations so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of stored items.
    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_on_read.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog read failed".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog write failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get(&self, id: &ItemId) -> Result<Option<CatalogItem>> {
        self.check_read()?;
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<CatalogItem>> {
        self.check_read()?;
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn create(&self, item: NewCatalogItem, created_by: UserId) -> Result<CatalogItem> {
        self.check_write()?;
        item.validate()?;

        let id = ItemId::new(Uuid::new_v4().simple().to_string());
        let item = item.into_item(id, created_by);
        self.items.write().await.insert(item.id.clone(), item.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(item)
    }

    async fn set_stock(
        &self,
        id: &ItemId,
        stock: i32,
        updated_by: UserId,
    ) -> Result<CatalogItem> {
        self.check_write()?;
        if stock < 0 {
            return Err(CatalogError::InvalidItem(format!(
                "stock must be non-negative, got {stock}"
            )));
        }

        let mut items = self.items.write().await;
        let item = items
            .get_mut(id)
            .ok_or_else(|| CatalogError::ItemNotFound(id.clone()))?;
        item.stock = stock;
        item.updated_by = updated_by;
        item.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(item.clone())
    }

    async fn delete(&self, id: &ItemId) -> Result<bool> {
        self.check_write()?;
        let removed = self.items.write().await.remove(id).is_some();
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }
}
