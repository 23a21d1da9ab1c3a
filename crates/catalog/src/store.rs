use async_trait::async_trait;
use common::{ItemId, UserId};

use crate::{CatalogItem, NewCatalogItem, Result};

/// Core trait for catalog store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns an item by ID, if it exists.
    async fn get(&self, id: &ItemId) -> Result<Option<CatalogItem>>;

    /// Returns every item, ordered by ID.
    async fn list(&self) -> Result<Vec<CatalogItem>>;

    /// Creates an item under a newly generated ID.
    async fn create(&self, item: NewCatalogItem, created_by: UserId) -> Result<CatalogItem>;

    /// Sets an item's stock to an absolute value.
    ///
    /// Fails with `ItemNotFound` if the item does not exist.
    async fn set_stock(
        &self,
        id: &ItemId,
        stock: i32,
        updated_by: UserId,
    ) -> Result<CatalogItem>;

    /// Removes an item. Returns `false` if it did not exist.
    async fn delete(&self, id: &ItemId) -> Result<bool>;
}
