//! Orchestrator and dispatcher settings.

use std::time::Duration;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound for a single outbound call; the caller's deadline may cut it shorter.
    pub rpc_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

/// Outbox dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Time between dispatch runs when nothing signals new rows.
    pub poll_interval: Duration,
    /// Max outbox rows published per run.
    pub batch_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
        }
    }
}

impl DispatcherConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}
