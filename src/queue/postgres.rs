//! PostgreSQL queue backend
//!
//! Queues live in a single `queue_items` table keyed by `queue_name`. Pops
//! lock the head row with `FOR UPDATE SKIP LOCKED` so concurrent consumers
//! never receive the same payload.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

use super::backend::QueueBackend;
use crate::error::{CoordinatorError, Result};

#[derive(Clone)]
pub struct PostgresQueue {
    pool: PgPool,
}

impl PostgresQueue {
    /// Connect a new pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL queue backend");
        Ok(Self { pool })
    }

    /// Reuse an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(err: sqlx::Error) -> CoordinatorError {
    CoordinatorError::QueueUnavailable(err.to_string())
}

#[async_trait]
impl QueueBackend for PostgresQueue {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_items (queue_name, payload)
            VALUES ($1, $2)
            "#,
        )
        .bind(queue)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        debug!(queue, "pushed queue item");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE queue_name = $1
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING payload
            "#,
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("payload")))
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS depth FROM queue_items WHERE queue_name = $1")
            .bind(queue)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)?;

        let depth: i64 = row.get("depth");
        Ok(depth.max(0) as usize)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
