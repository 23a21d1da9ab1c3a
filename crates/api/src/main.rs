//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::error::StartupError;
use catalog::{CatalogChangeHandler, InMemoryCatalogStore};
use event_bus::{BusDeadLetterSink, EventBus, EventConsumer, InMemoryEventBus, PostgresEventBus};
use ledger::{InMemoryLedger, InventoryLedger, PostgresLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::{InMemoryIdentityAuthority, OutboxDispatcher};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;

    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let ledger = PostgresLedger::new(pool.clone());
            ledger.run_migrations().await?;
            let bus = PostgresEventBus::new(pool, config.bus_partitions);
            tracing::info!(partitions = config.bus_partitions, "using Postgres ledger and bus");
            serve(config, ledger, bus, metrics_handle).await
        }
        None => {
            let ledger = InMemoryLedger::new();
            let bus = InMemoryEventBus::with_partitions(config.bus_partitions);
            tracing::info!(partitions = config.bus_partitions, "using in-memory ledger and bus");
            serve(config, ledger, bus, metrics_handle).await
        }
    }
}

/// Wires the orchestrator, outbox dispatcher and consumer around `ledger`
/// and `bus`, then serves HTTP until a shutdown signal arrives.
async fn serve<L, B>(
    config: Config,
    ledger: L,
    bus: B,
    metrics_handle: PrometheusHandle,
) -> Result<(), StartupError>
where
    L: InventoryLedger + Clone + 'static,
    B: EventBus + Clone + 'static,
{
    let identity = InMemoryIdentityAuthority::new();
    let catalog = InMemoryCatalogStore::new();

    if config.seed_demo_data {
        match api::demo::seed(&identity, &catalog).await {
            Ok(seeded) => tracing::info!(
                token = seeded.token.as_deref().unwrap_or_default(),
                items = ?seeded.item_ids,
                "seeded demo user and catalog items"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to seed demo data"),
        }
    }

    let state = api::create_default_state(ledger.clone(), identity, catalog.clone(), &config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = OutboxDispatcher::new(ledger, bus.clone(), config.dispatcher_config())
        .with_signal(state.orchestrator.outbox_signal());
    let dispatcher_rx = shutdown_rx.clone();
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(dispatcher_rx).await });

    let consumer = Arc::new(EventConsumer::new(
        bus.clone(),
        CatalogChangeHandler::new(catalog),
        BusDeadLetterSink::new(bus),
        config.consumer_config(),
    ));
    let consumer_tasks = consumer.spawn(shutdown_rx);

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let background tasks finish their current batch before exiting
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_task.await {
        tracing::warn!(error = %e, "outbox dispatcher task failed");
    }
    for task in consumer_tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "consumer task failed");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
