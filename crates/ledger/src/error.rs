use thiserror::Error;

use common::ItemId;

/// Errors that can occur when interacting with the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No live record exists for the item.
    #[error("Inventory record not found: {0}")]
    RecordNotFound(ItemId),

    /// A live record already exists for the item.
    #[error("Inventory record already exists: {0}")]
    DuplicateRecord(ItemId),

    /// The ledger could not be reached.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbox row carries a topic the bus does not know.
    #[error("Invalid outbox entry: {0}")]
    InvalidOutboxEntry(#[from] event_bus::BusError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
