//! pgmq queue operations via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read_with_poll,
//! pgmq.archive, pgmq.delete.

use super::{MessageId, QueueClient, QueueMessage};
use crate::error::Result;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// How often pgmq re-checks the queue during a long poll.
const POLL_INTERVAL_MS: i32 = 250;

/// A pgmq queue. Owns the connection pool for the queue database.
#[derive(Clone)]
pub struct PgmqQueue {
    pool: PgPool,
    queue_name: String,
}

impl PgmqQueue {
    /// Connect to Postgres for the named queue.
    pub async fn connect(url: &str, queue_name: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(url)
            .await?;
        Ok(Self::with_pool(pool, queue_name))
    }

    pub fn with_pool(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Create the queue (idempotent).
    pub async fn create(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;
        self.record("create");
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn record(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue_name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

fn whole_seconds(d: Duration) -> i32 {
    i32::try_from(d.as_secs()).unwrap_or(i32::MAX)
}

#[async_trait]
impl QueueClient for PgmqQueue {
    async fn receive(
        &self,
        max_messages: u32,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let rows = sqlx::query_as::<_, (i64, i32, chrono::DateTime<chrono::Utc>, String)>(
            "SELECT msg_id, read_ct, enqueued_at, message::text
             FROM pgmq.read_with_poll($1, $2, $3, $4, $5)",
        )
        .bind(&self.queue_name)
        .bind(whole_seconds(visibility_timeout).max(1))
        .bind(i32::try_from(max_messages).unwrap_or(i32::MAX))
        .bind(whole_seconds(wait))
        .bind(POLL_INTERVAL_MS)
        .fetch_all(&self.pool)
        .await?;

        self.record(if rows.is_empty() { "read_empty" } else { "read" });

        Ok(rows
            .into_iter()
            .map(|(msg_id, read_ct, enqueued_at, body)| QueueMessage {
                id: MessageId(msg_id),
                read_count: u32::try_from(read_ct).unwrap_or(0),
                enqueued_at,
                body,
            })
            .collect())
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue_name)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        self.record("delete");
        Ok(())
    }

    /// Archive a message (moves to the archive table, preserved for audit).
    async fn archive(&self, id: MessageId) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue_name)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        self.record("archive");
        Ok(())
    }

    async fn send(&self, body: &serde_json::Value) -> Result<MessageId> {
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, 0)")
            .bind(&self.queue_name)
            .bind(body)
            .fetch_one(&self.pool)
            .await?;
        self.record("send");
        Ok(MessageId(row.0))
    }
}
