use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::job::Job;

use super::{decode, encode, Queue, Result};

/// SQLite-backed transport for single-host deployments.
///
/// Each queued job is one row holding its serialized form. Dequeue deletes
/// and returns the oldest row in a single statement, which is what makes the
/// pop atomic across workers sharing the database.
pub struct SqliteQueue {
    pub pool: SqlitePool,
    key: String,
}

impl SqliteQueue {
    /// Open (creating if needed) the database at `database_url`
    pub async fn new(database_url: &str, key: impl Into<String>) -> std::result::Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        // In-memory databases are private to a connection, so they must not
        // be spread over a pool.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(pool, key).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory(key: impl Into<String>) -> std::result::Result<Self, sqlx::Error> {
        Self::new("sqlite::memory:", key).await
    }

    /// Use an existing pool, creating the queue table if missing
    pub async fn from_pool(pool: SqlitePool, key: impl Into<String>) -> std::result::Result<Self, sqlx::Error> {
        let queue = Self {
            pool,
            key: key.into(),
        };
        queue.configure().await?;
        queue.migrate().await?;
        Ok(queue)
    }

    async fn configure(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await?;

        sqlx::query("PRAGMA busy_timeout=5000;")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn migrate(&self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queued_jobs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                job_id TEXT NOT NULL,
                body BLOB NOT NULL,
                enqueued_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_queued_jobs_queue_seq ON queued_jobs(queue, seq)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Queue for SqliteQueue {
    async fn enqueue(&self, job: &Job) -> Result<()> {
        let body = encode(job)?;

        sqlx::query(
            r#"
            INSERT INTO queued_jobs (queue, job_id, body, enqueued_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&self.key)
        .bind(&job.id.0)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            DELETE FROM queued_jobs
            WHERE seq = (
                SELECT seq FROM queued_jobs
                WHERE queue = ?
                ORDER BY seq ASC
                LIMIT 1
            )
            RETURNING body
            "#,
        )
        .bind(&self.key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let body: Vec<u8> = row.get("body");
                Ok(Some(decode(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_jobs WHERE queue = ?")
            .bind(&self.key)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}
