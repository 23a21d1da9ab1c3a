//! Shared identifiers and the explicit caller context threaded through
//! every cross-service call.

pub mod context;
pub mod types;

pub use context::CallerContext;
pub use types::{ItemId, UserId};
