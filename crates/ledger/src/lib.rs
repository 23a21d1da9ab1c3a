//! Inventory ledger: the inventory service's own stock records.
//!
//! Every write can carry a change event that is committed to the outbox in
//! the same transaction, so a committed stock change is never lost on its
//! way to the catalog.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod record;

pub use error::{LedgerError, Result};
pub use ledger::{InventoryLedger, InventoryLedgerExt, WriteOptions};
pub use memory::InMemoryLedger;
pub use outbox::{OutboxEntry, OutboxId};
pub use postgres::PostgresLedger;
pub use record::{DEFAULT_MAX_STOCK, DEFAULT_MIN_STOCK, InventoryRecord};
