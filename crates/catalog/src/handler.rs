//! Applies inventory change events to the catalog.

use async_trait::async_trait;
use event_bus::{ChangeHandler, HandlerError, ItemDeleteEvent, StockUpdateEvent};

use crate::{CatalogError, store::CatalogStore};

/// Change handler that mirrors inventory changes into a [`CatalogStore`].
///
/// Both operations are idempotent: a stock update is an absolute set, and
/// deleting an item that is already gone succeeds. A stock update for an
/// item that no longer exists is acknowledged, since a delete always wins.
pub struct CatalogChangeHandler<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> CatalogChangeHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: CatalogStore> ChangeHandler for CatalogChangeHandler<S> {
    #[tracing::instrument(skip(self, event), fields(item_id = %event.item_id, new_stock = event.new_stock))]
    async fn handle_stock_update(&self, event: &StockUpdateEvent) -> Result<(), HandlerError> {
        match self
            .store
            .set_stock(&event.item_id, event.new_stock, event.user_id)
            .await
        {
            Ok(_) => {
                metrics::counter!("catalog_stock_applied_total").increment(1);
                tracing::debug!("catalog stock updated");
                Ok(())
            }
            Err(CatalogError::ItemNotFound(_)) => {
                tracing::warn!("stock update for missing catalog item ignored");
                Ok(())
            }
            Err(e) => Err(HandlerError::new(e.to_string())),
        }
    }

    #[tracing::instrument(skip(self, event), fields(item_id = %event.item_id))]
    async fn handle_item_delete(&self, event: &ItemDeleteEvent) -> Result<(), HandlerError> {
        let removed = self
            .store
            .delete(&event.item_id)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        if removed {
            metrics::counter!("catalog_items_removed_total").increment(1);
            tracing::debug!("catalog item deleted");
        } else {
            tracing::debug!("catalog item already deleted");
        }
        Ok(())
    }
}
