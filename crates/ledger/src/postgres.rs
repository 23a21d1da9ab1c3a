use async_trait::async_trait;
use common::{ItemId, UserId};
use event_bus::ChangeEvent;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    InventoryRecord, LedgerError, OutboxEntry, OutboxId, Result,
    ledger::{InventoryLedger, WriteOptions},
    outbox::NewOutboxEntry,
};

const RECORD_COLUMNS: &str =
    "item_id, stock, min_stock, max_stock, updated_by, created_at, updated_at, deleted_at";

/// PostgreSQL-backed inventory ledger.
///
/// Each mutation runs in one transaction together with the insert of its
/// outbox row.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<InventoryRecord> {
        let item_id: String = row.try_get("item_id")?;
        let updated_by: i64 = row.try_get("updated_by")?;

        Ok(InventoryRecord {
            item_id: ItemId::new(item_id),
            stock: row.try_get("stock")?,
            min_stock: row.try_get("min_stock")?,
            max_stock: row.try_get("max_stock")?,
            updated_by: UserId::new(updated_by as u32),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxEntry> {
        let topic: String = row.try_get("topic")?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxEntry {
            id: OutboxId::new(row.try_get("id")?),
            topic: topic.parse()?,
            key: row.try_get("message_key")?,
            payload: row.try_get("payload")?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn enqueue(tx: &mut Transaction<'_, Postgres>, options: &WriteOptions) -> Result<()> {
        let Some(event) = &options.event else {
            return Ok(());
        };
        let entry = NewOutboxEntry::from_event(event)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO outbox (topic, message_key, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(entry.topic.as_str())
        .bind(&entry.key)
        .bind(&entry.payload)
        .fetch_one(&mut **tx)
        .await?;

        tracing::debug!(outbox_id = id, topic = %entry.topic, key = %entry.key, "outbox row enqueued");
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresLedger {
    async fn get(&self, item_id: &ItemId) -> Result<Option<InventoryRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE item_id = $1 AND deleted_at IS NULL"
        ))
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<InventoryRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE deleted_at IS NULL ORDER BY item_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn create(
        &self,
        record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO inventory (item_id, stock, min_stock, max_stock, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.item_id.as_str())
        .bind(record.stock)
        .bind(record.min_stock)
        .bind(record.max_stock)
        .bind(i64::from(record.updated_by.as_u32()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                tracing::debug!(item_id = %record.item_id, "live record already exists");
                LedgerError::DuplicateRecord(record.item_id.clone())
            }
            other => LedgerError::Database(other),
        })?;

        Self::enqueue(&mut tx, &options).await?;
        tx.commit().await?;

        Self::row_to_record(row)
    }

    async fn update(
        &self,
        record: InventoryRecord,
        options: WriteOptions,
    ) -> Result<InventoryRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE inventory
            SET stock = $2, min_stock = $3, max_stock = $4, updated_by = $5, updated_at = NOW()
            WHERE item_id = $1 AND deleted_at IS NULL
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.item_id.as_str())
        .bind(record.stock)
        .bind(record.min_stock)
        .bind(record.max_stock)
        .bind(i64::from(record.updated_by.as_u32()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(LedgerError::RecordNotFound(record.item_id));
        };

        Self::enqueue(&mut tx, &options).await?;
        tx.commit().await?;

        Self::row_to_record(row)
    }

    async fn delete(&self, item_id: &ItemId, options: WriteOptions) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE item_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(item_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::RecordNotFound(item_id.clone()));
        }

        Self::enqueue(&mut tx, &options).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn reconcile_stock(&self, item_id: &ItemId, observed: i32) -> Result<Option<i32>> {
        let mut tx = self.pool.begin().await?;

        // Row lock orders this read after any in-flight write to the record
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory WHERE item_id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(item_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = row.map(Self::row_to_record).transpose()? else {
            return Ok(None);
        };
        if record.stock == observed {
            return Ok(None);
        }

        let event = ChangeEvent::stock_update(item_id.clone(), record.stock, record.updated_by);
        Self::enqueue(&mut tx, &WriteOptions::with_event(event)).await?;
        tx.commit().await?;

        tracing::info!(%item_id, observed, stock = record.stock, "stock re-announced");
        Ok(Some(record.stock))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, topic, message_key, payload, attempts, last_error, created_at
            FROM outbox
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_published(&self, id: OutboxId) -> Result<()> {
        sqlx::query("DELETE FROM outbox WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_publish_failure(&self, id: OutboxId, error: &str) -> Result<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, item_id: &ItemId) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM inventory WHERE item_id = $1 AND deleted_at IS NULL)",
        )
        .bind(item_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}
