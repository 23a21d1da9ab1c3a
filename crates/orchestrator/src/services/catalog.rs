//! Catalog service client trait and in-process implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog::{CatalogError, CatalogItem, CatalogStore};
use common::{CallerContext, ItemId};

use super::ServiceError;

const SERVICE: &str = "catalog";

/// Answer to a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyDeleted,
}

/// Trait for the catalog operations the orchestrator needs.
///
/// Writes are attributed to the caller in `ctx`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Fetches an item; `Ok(None)` if the catalog does not know it.
    async fn get_item(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
    ) -> Result<Option<CatalogItem>, ServiceError>;

    /// Sets the item's stock to an absolute value.
    async fn update_stock(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
        new_stock: i32,
    ) -> Result<CatalogItem, ServiceError>;

    /// Deletes the item.
    async fn delete_item(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
    ) -> Result<DeleteOutcome, ServiceError>;
}

/// Catalog client that calls a [`CatalogStore`] in-process.
///
/// Supports latency and per-operation failure injection for tests.
#[derive(Debug, Clone)]
pub struct LocalCatalogClient<S: CatalogStore> {
    store: S,
    fail_on_get: Arc<AtomicBool>,
    fail_on_update: Arc<AtomicBool>,
    fail_on_delete: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl<S: CatalogStore> LocalCatalogClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            fail_on_get: Arc::new(AtomicBool::new(false)),
            fail_on_update: Arc::new(AtomicBool::new(false)),
            fail_on_delete: Arc::new(AtomicBool::new(false)),
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.fail_on_get.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_update(&self, fail: bool) {
        self.fail_on_update.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_delete(&self, fail: bool) {
        self.fail_on_delete.store(fail, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_call(&self, fail: &AtomicBool) -> Result<(), ServiceError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

fn into_service_error(error: CatalogError) -> ServiceError {
    match error {
        CatalogError::Unavailable(reason) => ServiceError::Unavailable {
            service: SERVICE,
            reason,
        },
        CatalogError::ItemNotFound(_) => ServiceError::NotFound { service: SERVICE },
        other => ServiceError::Rejected {
            service: SERVICE,
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl<S: CatalogStore> CatalogClient for LocalCatalogClient<S> {
    async fn get_item(
        &self,
        _ctx: &CallerContext,
        item_id: &ItemId,
    ) -> Result<Option<CatalogItem>, ServiceError> {
        self.simulate_call(&self.fail_on_get).await?;
        self.store.get(item_id).await.map_err(into_service_error)
    }

    async fn update_stock(
        &self,
        ctx: &CallerContext,
        item_id: &ItemId,
        new_stock: i32,
    ) -> Result<CatalogItem, ServiceError> {
        self.simulate_call(&self.fail_on_update).await?;
        self.store
            .set_stock(item_id, new_stock, ctx.user_id())
            .await
            .map_err(into_service_error)
    }

    async fn delete_item(
        &self,
        _ctx: &CallerContext,
        item_id: &ItemId,
    ) -> Result<DeleteOutcome, ServiceError> {
        self.simulate_call(&self.fail_on_delete).await?;
        let removed = self
            .store
            .delete(item_id)
            .await
            .map_err(into_service_error)?;
        Ok(if removed {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::AlreadyDeleted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{InMemoryCatalogStore, NewCatalogItem};
    use common::UserId;

    async fn client_with_item() -> (LocalCatalogClient<InMemoryCatalogStore>, ItemId) {
        let store = InMemoryCatalogStore::new();
        let item = store
            .create(NewCatalogItem::new("Widget", 1.0, 5), UserId::new(1))
            .await
            .unwrap();
        (LocalCatalogClient::new(store), item.id)
    }

    fn ctx() -> CallerContext {
        CallerContext::new(UserId::new(42), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_update_stock_attributes_caller() {
        let (client, id) = client_with_item().await;
        let item = client.update_stock(&ctx(), &id, 10).await.unwrap();
        assert_eq!(item.stock, 10);
        assert_eq!(item.updated_by, UserId::new(42));
    }

    #[tokio::test]
    async fn test_get_missing_item() {
        let (client, _) = client_with_item().await;
        assert!(client
            .get_item(&ctx(), &ItemId::new("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let (client, _) = client_with_item().await;
        let result = client.update_stock(&ctx(), &ItemId::new("missing"), 1).await;
        assert_eq!(result.unwrap_err(), ServiceError::NotFound { service: "catalog" });
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (client, id) = client_with_item().await;
        assert_eq!(
            client.delete_item(&ctx(), &id).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            client.delete_item(&ctx(), &id).await.unwrap(),
            DeleteOutcome::AlreadyDeleted
        );
    }

    #[tokio::test]
    async fn test_failure_injection_per_operation() {
        let (client, id) = client_with_item().await;
        client.set_fail_on_update(true);
        assert!(client.update_stock(&ctx(), &id, 1).await.is_err());
        assert!(client.get_item(&ctx(), &id).await.is_ok());
        assert_eq!(client.store().get(&id).await.unwrap().unwrap().stock, 5);
    }
}
