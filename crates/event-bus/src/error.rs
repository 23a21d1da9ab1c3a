use thiserror::Error;

/// Errors that can occur when publishing to or consuming from the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The topic name is not one the bus knows about.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The partition is outside the topic's partition range.
    #[error("Invalid partition {partition} for topic {topic}: bus has {partitions} partitions")]
    InvalidPartition {
        topic: String,
        partition: u32,
        partitions: u32,
    },

    /// The bus could not accept or serve the request (broker down, injected failure).
    #[error("Bus unavailable: {0}")]
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
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
