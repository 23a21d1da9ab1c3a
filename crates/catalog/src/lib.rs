//! Catalog side: item store and the handler that applies inventory changes.

pub mod error;
pub mod handler;
pub mod item;
pub mod memory;
pub mod store;

pub use error::{CatalogError, Result};
pub use handler::CatalogChangeHandler;
pub use item::{CatalogItem, NewCatalogItem};
pub use memory::InMemoryCatalogStore;
pub use store::CatalogStore;
