use chrono::{DateTime, Utc};
use common::{ItemId, UserId};
use serde::{Deserialize, Serialize};

use crate::{CatalogError, Result};

/// A sellable item owned by the catalog, with its current stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub stock: i32,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCatalogItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub stock: i32,
}

impl NewCatalogItem {
    pub fn new(name: impl Into<String>, price: f64, stock: i32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            category: String::new(),
            stock,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Checks the catalog rules: a name, a non-negative price and stock.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::InvalidItem("name is required".to_string()));
        }
        if self.price.is_nan() || self.price < 0.0 {
            return Err(CatalogError::InvalidItem(format!(
                "price must be non-negative, got {}",
                self.price
            )));
        }
        if self.stock < 0 {
            return Err(CatalogError::InvalidItem(format!(
                "stock must be non-negative, got {}",
                self.stock
            )));
        }
        Ok(())
    }

    /// Turns the request into a stored item.
    pub fn into_item(self, id: ItemId, created_by: UserId) -> CatalogItem {
        let now = Utc::now();
        CatalogItem {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            category: self.category,
            stock: self.stock,
            created_by,
            updated_by: created_by,
            created_at: now,
            updated_at: now,
        }
    }
}
