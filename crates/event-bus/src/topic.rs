//! Topics and key-based partition assignment.

use serde::{Deserialize, Serialize};

use crate::BusError;

/// The topics carried by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Absolute stock changes for catalog items.
    StockUpdates,
    /// Catalog item deletions.
    ItemDeletes,
    /// Messages a consumer gave up on.
    DeadLetters,
}

impl Topic {
    /// The topics the catalog-side consumer subscribes to.
    pub const CHANGE_TOPICS: [Topic; 2] = [Topic::StockUpdates, Topic::ItemDeletes];

    /// Returns the wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::StockUpdates => "stock_updates",
            Topic::ItemDeletes => "item_deletes",
            Topic::DeadLetters => "dead_letters",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock_updates" => Ok(Topic::StockUpdates),
            "item_deletes" => Ok(Topic::ItemDeletes),
            "dead_letters" => Ok(Topic::DeadLetters),
            other => Err(BusError::UnknownTopic(other.to_string())),
        }
    }
}

/// Maps a message key onto one of `partitions` partitions.
///
/// Uses 32-bit FNV-1a so the assignment is stable across processes and
/// releases; every message for the same key lands on the same partition.
/// Unkeyed messages go to partition 0.
pub fn partition_for(key: Option<&str>, partitions: u32) -> u32 {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let partitions = partitions.max(1);
    let Some(key) = key else {
        return 0;
    };

    let hash = key.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    });
    hash % partitions
}
