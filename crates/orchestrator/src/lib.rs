//! Inventory orchestration.
//!
//! [`InventoryOrchestrator`] runs the synchronous stock and delete flows;
//! [`OutboxDispatcher`] publishes the change events they commit.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod services;

pub use config::{DispatcherConfig, OrchestratorConfig};
pub use dispatcher::{DispatchResult, OutboxDispatcher};
pub use error::{OrchestratorError, Result};
pub use orchestrator::InventoryOrchestrator;
pub use services::catalog::{CatalogClient, DeleteOutcome, LocalCatalogClient};
pub use services::identity::{
    Claims, IdentityAuthority, InMemoryIdentityAuthority, TokenValidation, User, UserLookup,
};
pub use services::{ServiceError, call_with_deadline};
