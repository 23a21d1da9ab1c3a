//! Inventory stock and delete endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::ItemId;
use ledger::{InventoryLedger, InventoryRecord};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::caller_context;
use crate::error::ApiError;
use crate::routes::ApiResponse;

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStockRequest {
    pub new_stock: i64,
}

/// POST /inventory/stock/{item_id}: sets the stock of an item.
pub async fn update_stock<L: InventoryLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdateStockRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<InventoryRecord>>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let ctx = caller_context(&state, &headers).await?;

    let record = state
        .orchestrator
        .update_stock(&ctx, &ItemId::new(item_id), request.new_stock)
        .await?;

    Ok(Json(ApiResponse::ok("stock updated", record)))
}

/// GET /inventory/stock/{item_id}: returns the ledger record of an item.
pub async fn get_stock<L: InventoryLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<InventoryRecord>>, ApiError> {
    let ctx = caller_context(&state, &headers).await?;
    let record = state
        .orchestrator
        .get_stock(&ctx, &ItemId::new(item_id))
        .await?;
    Ok(Json(ApiResponse::ok("stock retrieved", record)))
}

/// GET /inventory: lists every live ledger record.
pub async fn list<L: InventoryLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Vec<InventoryRecord>>>, ApiError> {
    let ctx = caller_context(&state, &headers).await?;
    let records = state.orchestrator.list_inventory(&ctx).await?;
    let message = format!("{} items", records.len());
    Ok(Json(ApiResponse::ok(message, records)))
}

/// DELETE /inventory/item/{item_id}: removes an item from the catalog and the ledger.
pub async fn delete_item<L: InventoryLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let ctx = caller_context(&state, &headers).await?;
    state
        .orchestrator
        .delete_item(&ctx, &ItemId::new(item_id))
        .await?;
    Ok(Json(ApiResponse::done("item deleted")))
}
