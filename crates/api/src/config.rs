//! Application configuration loaded from environment variables.

use std::time::Duration;

use event_bus::{ConsumerConfig, DEFAULT_PARTITIONS};
use orchestrator::{DispatcherConfig, OrchestratorConfig};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres URL; when unset the ledger and bus are in-memory
/// - `RPC_TIMEOUT_MS`: per-call timeout for identity and catalog calls (default: `5000`)
/// - `REQUEST_TIMEOUT_MS`: overall deadline of one request (default: `10000`)
/// - `BUS_PARTITIONS`: partitions per topic (default: `3`)
/// - `CONSUMER_GROUP`: consumer group name (default: `"item-service-group"`)
/// - `CONSUMER_MAX_ATTEMPTS`: handling attempts before dead-lettering (default: `5`)
/// - `OUTBOX_POLL_INTERVAL_MS`: outbox dispatcher tick (default: `500`)
/// - `OUTBOX_BATCH_SIZE`: outbox rows per tick (default: `100`)
/// - `SEED_DEMO_DATA`: seed a demo user and catalog items (default: `true`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub rpc_timeout: Duration,
    pub request_timeout: Duration,
    pub bus_partitions: u32,
    pub consumer_group: String,
    pub consumer_max_attempts: u32,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub seed_demo_data: bool,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            rpc_timeout: parsed("RPC_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.rpc_timeout),
            request_timeout: parsed("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            bus_partitions: parsed("BUS_PARTITIONS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.bus_partitions),
            consumer_group: lookup("CONSUMER_GROUP")
                .filter(|g| !g.is_empty())
                .unwrap_or(defaults.consumer_group),
            consumer_max_attempts: parsed("CONSUMER_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.consumer_max_attempts),
            outbox_poll_interval: parsed("OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
            outbox_batch_size: parsed("OUTBOX_BATCH_SIZE")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbox_batch_size),
            seed_demo_data: lookup("SEED_DEMO_DATA")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(defaults.seed_demo_data),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default().with_rpc_timeout(self.rpc_timeout)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_poll_interval(self.outbox_poll_interval)
            .with_batch_size(self.outbox_batch_size)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig::default()
            .with_group(self.consumer_group.clone())
            .with_max_attempts(self.consumer_max_attempts)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            rpc_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            bus_partitions: DEFAULT_PARTITIONS,
            consumer_group: "item-service-group".to_string(),
            consumer_max_attempts: 5,
            outbox_poll_interval: Duration::from_millis(500),
            outbox_batch_size: 100,
            seed_demo_data: true,
        }
    }
}
