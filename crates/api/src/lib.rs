//! HTTP API server with observability for inventory orchestration.
//!
//! Exposes stock and delete operations over REST, with structured logging
//! (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod demo;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get};
use catalog::InMemoryCatalogStore;
use ledger::InventoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{InMemoryIdentityAuthority, InventoryOrchestrator, LocalCatalogClient};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Orchestrator wired to the in-process identity authority and catalog.
pub type Orchestrator<L> =
    InventoryOrchestrator<InMemoryIdentityAuthority, LocalCatalogClient<InMemoryCatalogStore>, L>;

/// Shared application state for the inventory routes.
pub struct AppState<L: InventoryLedger> {
    pub orchestrator: Orchestrator<L>,
    /// Deadline given to each authenticated request.
    pub request_timeout: Duration,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: InventoryLedger + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/inventory", get(routes::inventory::list::<L>))
        .route("/inventory/items", get(routes::inventory::list::<L>))
        .route(
            "/inventory/stock/{item_id}",
            get(routes::inventory::get_stock::<L>).post(routes::inventory::update_stock::<L>),
        )
        .route(
            "/inventory/item/{item_id}",
            delete(routes::inventory::delete_item::<L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around `ledger` and the in-process collaborators.
///
/// The orchestrator's outbox signal can be shared with a dispatcher via
/// `state.orchestrator.outbox_signal()`.
pub fn create_default_state<L: InventoryLedger + 'static>(
    ledger: L,
    identity: InMemoryIdentityAuthority,
    catalog: InMemoryCatalogStore,
    config: &Config,
) -> Arc<AppState<L>> {
    let orchestrator = InventoryOrchestrator::new(
        identity,
        LocalCatalogClient::new(catalog),
        ledger,
        config.orchestrator_config(),
    );

    Arc::new(AppState {
        orchestrator,
        request_timeout: config.request_timeout,
    })
}
