//! The inventory-side stock record.

use chrono::{DateTime, Utc};
use common::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// Soft lower stock bound given to new records.
pub const DEFAULT_MIN_STOCK: i32 = 0;

/// Soft upper stock bound given to new records.
pub const DEFAULT_MAX_STOCK: i32 = 1000;

/// Stock record for one catalog item.
///
/// `min_stock` and `max_stock` are informational; writes never check them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub item_id: ItemId,
    pub stock: i32,
    pub min_stock: i32,
    pub max_stock: i32,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the record is tombstoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InventoryRecord {
    /// Creates a live record with default bounds.
    pub fn new(item_id: ItemId, stock: i32, updated_by: UserId) -> Self {
        let now = Utc::now();
        Self {
            item_id,
            stock,
            min_stock: DEFAULT_MIN_STOCK,
            max_stock: DEFAULT_MAX_STOCK,
            updated_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Overwrites the stock and the last writer.
    pub fn set_stock(&mut self, stock: i32, updated_by: UserId) {
        self.stock = stock;
        self.updated_by = updated_by;
        self.updated_at = Utc::now();
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
