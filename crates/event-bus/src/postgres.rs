use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    BusMessage, Delivery, Offset, OutgoingMessage, Result, Topic,
    bus::{EventBus, validate_partition},
    topic::partition_for,
};

/// PostgreSQL-backed event bus implementation.
///
/// Each `(topic, partition)` is a log in `bus_messages`; offsets are assigned
/// under a transaction-scoped advisory lock so concurrent publishers never
/// hand out the same offset. Consumer positions live in `bus_offsets`.
#[derive(Clone)]
pub struct PostgresEventBus {
    pool: PgPool,
    partitions: u32,
}

impl PostgresEventBus {
    /// Creates a new PostgreSQL event bus.
    pub fn new(pool: PgPool, partitions: u32) -> Self {
        Self {
            pool,
            partitions: partitions.max(1),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_message(row: PgRow) -> Result<BusMessage> {
        let topic: String = row.try_get("topic")?;
        let partition: i32 = row.try_get("partition_no")?;

        Ok(BusMessage {
            topic: topic.parse()?,
            partition: partition as u32,
            offset: Offset::new(row.try_get("msg_offset")?),
            key: row.try_get("message_key")?,
            payload: row.try_get("payload")?,
            published_at: row.try_get("published_at")?,
        })
    }
}

#[async_trait]
impl EventBus for PostgresEventBus {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<Delivery> {
        let partition = partition_for(message.key.as_deref(), self.partitions);
        let topic = message.topic.as_str();

        let mut tx = self.pool.begin().await?;

        // Serialize offset assignment per (topic, partition)
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), $2)")
            .bind(topic)
            .bind(partition as i32)
            .execute(&mut *tx)
            .await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(msg_offset) + 1, 0) FROM bus_messages WHERE topic = $1 AND partition_no = $2",
        )
        .bind(topic)
        .bind(partition as i32)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO bus_messages (topic, partition_no, msg_offset, message_key, payload, published_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(topic)
        .bind(partition as i32)
        .bind(next)
        .bind(&message.key)
        .bind(&message.payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Delivery {
            partition,
            offset: Offset::new(next),
        })
    }

    async fn poll(
        &self,
        group: &str,
        topic: Topic,
        partition: u32,
        max: usize,
    ) -> Result<Vec<BusMessage>> {
        validate_partition(topic, partition, self.partitions)?;
        let from = self.committed(group, topic, partition).await?;

        let rows = sqlx::query(
            r#"
            SELECT topic, partition_no, msg_offset, message_key, payload, published_at
            FROM bus_messages
            WHERE topic = $1 AND partition_no = $2 AND msg_offset >= $3
            ORDER BY msg_offset ASC
            LIMIT $4
            "#,
        )
        .bind(topic.as_str())
        .bind(partition as i32)
        .bind(from.as_i64())
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn commit(&self, group: &str, topic: Topic, partition: u32, next: Offset) -> Result<()> {
        validate_partition(topic, partition, self.partitions)?;

        sqlx::query(
            r#"
            INSERT INTO bus_offsets (consumer_group, topic, partition_no, next_offset, committed_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (consumer_group, topic, partition_no) DO UPDATE SET
                next_offset = EXCLUDED.next_offset,
                committed_at = EXCLUDED.committed_at
            "#,
        )
        .bind(group)
        .bind(topic.as_str())
        .bind(partition as i32)
        .bind(next.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn committed(&self, group: &str, topic: Topic, partition: u32) -> Result<Offset> {
        validate_partition(topic, partition, self.partitions)?;

        let next: Option<i64> = sqlx::query_scalar(
            "SELECT next_offset FROM bus_offsets WHERE consumer_group = $1 AND topic = $2 AND partition_no = $3",
        )
        .bind(group)
        .bind(topic.as_str())
        .bind(partition as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(next.map(Offset::new).unwrap_or_default())
    }

    async fn end_offset(&self, topic: Topic, partition: u32) -> Result<Offset> {
        validate_partition(topic, partition, self.partitions)?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(msg_offset) + 1, 0) FROM bus_messages WHERE topic = $1 AND partition_no = $2",
        )
        .bind(topic.as_str())
        .bind(partition as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(Offset::new(next))
    }
}
