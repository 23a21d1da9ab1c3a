//! Catalog error types.

use common::ItemId;
use thiserror::Error;

/// Errors that can occur when working with the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No item exists with the given ID.
    #[error("Catalog item not found: {0}")]
    ItemNotFound(ItemId),

    /// The item fields violate a catalog rule.
    #[error("Invalid catalog item: {0}")]
    InvalidItem(String),

    /// The catalog store could not be reached.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
