//! Orchestration error types.

use common::ItemId;
use ledger::LedgerError;
use thiserror::Error;

/// Errors returned by orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The caller could not be confirmed as an active user.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The item is unknown to the catalog or has no inventory record.
    #[error("Item not found: {0}")]
    NotFound(ItemId),

    /// A downstream call failed or timed out after validation passed.
    #[error("Upstream call '{operation}' failed: {reason}")]
    Upstream {
        operation: &'static str,
        reason: String,
    },

    /// The request was rejected before any call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The local ledger failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl OrchestratorError {
    /// Returns a short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            OrchestratorError::Unauthorized(_) => "unauthorized",
            OrchestratorError::NotFound(_) => "not_found",
            OrchestratorError::Upstream { .. } => "upstream",
            OrchestratorError::Validation(_) => "validation",
            OrchestratorError::Ledger(_) => "ledger",
        }
    }
}

/// Convenience type alias for orchestration results.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
