//! SQLite-backed checkpoint saver
//!
//! One row per checkpoint in the `checkpoints` table, keyed by
//! `(thread_id, checkpoint_id)`:
//!
//! ```text
//! seq | thread_id | checkpoint_id | parent_checkpoint_id | schema_version | checkpoint (BLOB) | created_at
//! ```
//!
//! `seq` is the insertion order and drives "latest" and history paging.
//! The blob is the JSON encoding of [`Checkpoint`]; rows written by the
//! legacy layout are upgraded when read and can be rewritten in place with
//! [`SqliteCheckpointSaver::migrate_legacy`].

use crate::{
    checkpoint::{Checkpoint, CheckpointConfig},
    error::{CheckpointError, Result},
    serializer::{JsonSerializer, SerializerProtocol},
    traits::{check_append, AppendCheck, CheckpointSaver},
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Durable checkpoint saver on top of a SQLite database
#[derive(Clone, Debug)]
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
    serializer: JsonSerializer,
}

impl SqliteCheckpointSaver {
    /// Open (creating if needed) a database file and apply migrations.
    pub async fn open<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open database: {}", e)))?;

        info!(path = %path.display(), "Checkpoint database connection established");

        let saver = Self::from_pool(pool);
        saver.run_migrations().await?;
        Ok(saver)
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the saver.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let saver = Self::from_pool(pool);
        saver.run_migrations().await?;
        Ok(saver)
    }

    /// Wrap an existing pool. Call [`Self::run_migrations`] before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            serializer: JsonSerializer::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        debug!("Running checkpoint migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Threads with at least one stored checkpoint
    pub async fn thread_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("thread_id")).collect())
    }

    /// Rewrite every row stored under an older schema version in the current
    /// layout. Returns the number of rows upgraded.
    pub async fn migrate_legacy(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT seq, thread_id, checkpoint FROM checkpoints
             WHERE schema_version < ?
             ORDER BY seq",
        )
        .bind(Checkpoint::CURRENT_VERSION as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut upgraded = 0;
        for row in rows {
            let seq: i64 = row.get("seq");
            let thread_id: String = row.get("thread_id");
            let blob: Vec<u8> = row.get("checkpoint");

            let checkpoint = self.serializer.loads(&thread_id, &blob)?;
            let encoded = self.serializer.dumps(&checkpoint)?;

            sqlx::query(
                "UPDATE checkpoints
                 SET checkpoint = ?, schema_version = ?, parent_checkpoint_id = ?
                 WHERE seq = ?",
            )
            .bind(encoded)
            .bind(checkpoint.v as i64)
            .bind(&checkpoint.parent_id)
            .bind(seq)
            .execute(&mut *tx)
            .await?;

            upgraded += 1;
        }

        tx.commit().await?;
        info!(upgraded, "Migrated legacy checkpoints");
        Ok(upgraded)
    }

    fn decode(&self, thread_id: &str, row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint> {
        let blob: Vec<u8> = row.get("checkpoint");
        self.serializer.loads(thread_id, &blob)
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT checkpoint FROM checkpoints
             WHERE thread_id = ?
             ORDER BY seq DESC
             LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.decode(thread_id, &row)).transpose()
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            "SELECT checkpoint FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?",
        )
        .bind(thread_id)
        .bind(checkpoint_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.decode(thread_id, &row)).transpose()
    }

    async fn list_page(
        &self,
        thread_id: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Checkpoint>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = match before {
            Some(before_id) => {
                sqlx::query(
                    "SELECT checkpoint FROM checkpoints
                     WHERE thread_id = ?
                       AND seq < (SELECT seq FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?)
                     ORDER BY seq DESC
                     LIMIT ?",
                )
                .bind(thread_id)
                .bind(thread_id)
                .bind(before_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT checkpoint FROM checkpoints
                     WHERE thread_id = ?
                     ORDER BY seq DESC
                     LIMIT ?",
                )
                .bind(thread_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(|row| self.decode(thread_id, row)).collect()
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<CheckpointConfig> {
        let config = checkpoint.config();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT checkpoint FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| self.decode(&checkpoint.thread_id, &row))
        .transpose()?;

        let thread_is_empty = sqlx::query("SELECT 1 FROM checkpoints WHERE thread_id = ? LIMIT 1")
            .bind(&checkpoint.thread_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_none();

        let parent_exists = match &checkpoint.parent_id {
            Some(parent_id) => sqlx::query(
                "SELECT 1 FROM checkpoints WHERE thread_id = ? AND checkpoint_id = ?",
            )
            .bind(&checkpoint.thread_id)
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some(),
            None => false,
        };

        match check_append(&checkpoint, existing.as_ref(), thread_is_empty, parent_exists)? {
            AppendCheck::AlreadyStored => return Ok(config),
            AppendCheck::Insert => {}
        }

        let blob = self.serializer.dumps(&checkpoint)?;
        sqlx::query(
            "INSERT INTO checkpoints
                (thread_id, checkpoint_id, parent_checkpoint_id, schema_version, checkpoint, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.id)
        .bind(&checkpoint.parent_id)
        .bind(checkpoint.v as i64)
        .bind(blob)
        .bind(checkpoint.ts.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            thread_id = %checkpoint.thread_id,
            checkpoint_id = %checkpoint.id,
            "Stored checkpoint"
        );

        Ok(config)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        debug!(thread_id = %thread_id, deleted = result.rows_affected(), "Deleted thread");
        Ok(())
    }
}
