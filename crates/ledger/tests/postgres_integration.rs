//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the ledger tables
//! before each test. Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration
//! ```

use std::sync::Arc;

use common::{ItemId, UserId};
use event_bus::{ChangeEvent, Topic};
use ledger::{
    InventoryLedger, InventoryLedgerExt, InventoryRecord, LedgerError, PostgresLedger,
    WriteOptions,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for sql in [
                include_str!("../../../migrations/001_create_inventory_table.sql"),
                include_str!("../../../migrations/002_create_outbox_table.sql"),
            ] {
                sqlx::raw_sql(sql).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_ledger() -> PostgresLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE inventory, outbox RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresLedger::new(pool)
}

fn record(item: &str, stock: i32) -> InventoryRecord {
    InventoryRecord::new(ItemId::new(item), stock, UserId::new(42))
}

fn stock_event(item: &str, stock: i32) -> WriteOptions {
    WriteOptions::with_event(ChangeEvent::stock_update(
        ItemId::new(item),
        stock,
        UserId::new(42),
    ))
}

#[tokio::test]
#[serial]
async fn create_update_and_read_back() {
    let ledger = get_test_ledger().await;

    let created = ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();
    assert_eq!(created.stock, 5);
    assert_eq!(created.max_stock, 1000);

    let mut changed = created.clone();
    changed.set_stock(10, UserId::new(7));
    let updated = ledger.update(changed, WriteOptions::new()).await.unwrap();
    assert_eq!(updated.stock, 10);
    assert_eq!(updated.updated_by, UserId::new(7));
    assert_eq!(updated.created_at, created.created_at);

    let loaded = ledger.get_required(&ItemId::new("I1")).await.unwrap();
    assert_eq!(loaded, updated);
}

#[tokio::test]
#[serial]
async fn duplicate_live_record_rejected() {
    let ledger = get_test_ledger().await;
    ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();

    let result = ledger.create(record("I1", 6), stock_event("I1", 6)).await;
    assert!(matches!(result, Err(LedgerError::DuplicateRecord(_))));
    assert!(ledger.pending_outbox(10).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn tombstone_hides_record_and_allows_recreate() {
    let ledger = get_test_ledger().await;
    ledger.create(record("I1", 5), WriteOptions::new()).await.unwrap();
    ledger
        .delete(&ItemId::new("I1"), WriteOptions::new())
        .await
        .unwrap();

    assert!(!ledger.exists(&ItemId::new("I1")).await.unwrap());
    assert!(ledger.list().await.unwrap().is_empty());
    assert!(matches!(
        ledger.delete(&ItemId::new("I1"), WriteOptions::new()).await,
        Err(LedgerError::RecordNotFound(_))
    ));

    ledger.create(record("I1", 2), WriteOptions::new()).await.unwrap();
    assert_eq!(ledger.list().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn outbox_rows_commit_with_writes() {
    let ledger = get_test_ledger().await;
    ledger.create(record("I1", 5), stock_event("I1", 5)).await.unwrap();
    ledger
        .delete(
            &ItemId::new("I1"),
            WriteOptions::with_event(ChangeEvent::item_delete(ItemId::new("I1"), UserId::new(42))),
        )
        .await
        .unwrap();

    let missing = ledger.update(record("I2", 1), stock_event("I2", 1)).await;
    assert!(matches!(missing, Err(LedgerError::RecordNotFound(_))));

    let pending = ledger.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].topic, Topic::StockUpdates);
    assert_eq!(pending[0].key, "I1");
    assert_eq!(pending[0].payload["new_stock"], 5);
    assert_eq!(pending[1].topic, Topic::ItemDeletes);

    ledger
        .record_publish_failure(pending[0].id, "broker down")
        .await
        .unwrap();
    let retried = ledger.pending_outbox(1).await.unwrap();
    assert_eq!(retried[0].attempts, 1);
    assert_eq!(retried[0].last_error.as_deref(), Some("broker down"));

    ledger.mark_published(pending[0].id).await.unwrap();
    let rest = ledger.pending_outbox(10).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, pending[1].id);
}

#[tokio::test]
#[serial]
async fn reconcile_stock_reannounces_moved_record() {
    let ledger = get_test_ledger().await;
    let item = ItemId::new("I1");
    ledger
        .create(record("I1", 20), WriteOptions::new())
        .await
        .unwrap();

    assert_eq!(ledger.reconcile_stock(&item, 20).await.unwrap(), None);
    assert_eq!(ledger.outbox_depth(10).await.unwrap(), 0);

    assert_eq!(ledger.reconcile_stock(&item, 10).await.unwrap(), Some(20));
    let pending = ledger.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].topic, Topic::StockUpdates);
    assert_eq!(pending[0].payload["new_stock"], 20);

    ledger.delete(&item, WriteOptions::new()).await.unwrap();
    assert_eq!(ledger.reconcile_stock(&item, 10).await.unwrap(), None);
}
