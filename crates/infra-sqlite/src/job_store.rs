// SQLite JobStore Implementation
//
// Every protocol step is one conditional statement (UPDATE ... WHERE ... RETURNING),
// so SQLite's write lock alone gives each step its all-or-nothing semantics.

use async_trait::async_trait;
use outbox_core::domain::{Job, JobId, JobPayload, JobStatus, NewJob, Receipt};
use outbox_core::error::{AppError, Result};
use outbox_core::port::job_store::lease_deadline;
use outbox_core::port::{ClaimQuery, JobStore, ResolveUpdate};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::time::Duration;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "275" => AppError::Database(format!(
                        "Check constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" | "517" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

fn sql_limit(count: u32) -> i64 {
    i64::from(count)
}

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a pending job through any SQLite executor.
    ///
    /// Pass `&mut *tx` to write the job in the same local transaction as the
    /// business change that produced it; the job becomes claimable on commit.
    pub async fn insert_with<'e, E>(executor: E, job: &NewJob, now_millis: i64) -> Result<Job>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let data = job.data.as_value().to_string();
        let metadata = job.metadata.as_ref().map(|m| m.as_value().to_string());

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO outbox_jobs (
                key, data, metadata, attempt_count, receipt, next_visible_at,
                status, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, 0, NULL, NULL, NULL, ?, ?, NULL)
            RETURNING *
            "#,
        )
        .bind(job.key.as_str())
        .bind(data)
        .bind(metadata)
        .bind(now_millis)
        .bind(now_millis)
        .fetch_one(executor)
        .await
        .map_err(map_sqlx_error)?;

        row.into_job()
    }

    async fn peek(&self, query: &ClaimQuery, now_millis: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM outbox_jobs
            WHERE key = ? AND status IS NULL
              AND (next_visible_at IS NULL OR next_visible_at <= ?)
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(&query.key)
        .bind(now_millis)
        .bind(sql_limit(query.count))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &NewJob, now_millis: i64) -> Result<Job> {
        Self::insert_with(&self.pool, job, now_millis).await
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM outbox_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn claim_next(&self, query: &ClaimQuery, now_millis: i64) -> Result<Vec<Job>> {
        if query.peek {
            return self.peek(query, now_millis).await;
        }

        // Select and lease in one statement; each row gets its own fresh receipt
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            UPDATE outbox_jobs
            SET attempt_count = attempt_count + 1,
                receipt = lower(hex(randomblob(16))),
                next_visible_at = ?,
                updated_at = ?
            WHERE id IN (
                SELECT id FROM outbox_jobs
                WHERE key = ? AND status IS NULL
                  AND (next_visible_at IS NULL OR next_visible_at <= ?)
                ORDER BY id ASC
                LIMIT ?
            )
            RETURNING *
            "#,
        )
        .bind(lease_deadline(now_millis, query.lease))
        .bind(now_millis)
        .bind(&query.key)
        .bind(now_millis)
        .bind(sql_limit(query.count))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(key = %query.key, claimed = rows.len(), "Claimed jobs");

        // RETURNING order is unspecified
        let mut jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>>>()?;
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn resolve_job(
        &self,
        id: JobId,
        receipt: &Receipt,
        update: &ResolveUpdate,
        now_millis: i64,
    ) -> Result<Option<Job>> {
        let metadata = update
            .metadata
            .as_ref()
            .map(|m| m.as_value().to_string());

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE outbox_jobs
            SET status = ?,
                metadata = COALESCE(?, metadata),
                completed_at = COALESCE(?, completed_at),
                receipt = NULL,
                updated_at = ?
            WHERE id = ? AND receipt = ? AND status IS NULL
            RETURNING *
            "#,
        )
        .bind(update.status.map(|s| s.as_str()))
        .bind(metadata)
        .bind(update.completed_at)
        .bind(now_millis)
        .bind(id)
        .bind(receipt.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn activate_job(
        &self,
        id: JobId,
        lease: Duration,
        now_millis: i64,
    ) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE outbox_jobs
            SET attempt_count = attempt_count + 1,
                receipt = lower(hex(randomblob(16))),
                next_visible_at = ?,
                updated_at = ?
            WHERE id = ? AND status IS NULL
              AND (receipt IS NULL OR next_visible_at IS NULL OR next_visible_at <= ?)
            RETURNING *
            "#,
        )
        .bind(lease_deadline(now_millis, lease))
        .bind(now_millis)
        .bind(id)
        .bind(now_millis)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    key: String,
    data: String, // JSON text
    metadata: Option<String>,
    attempt_count: i64,
    receipt: Option<String>,
    next_visible_at: Option<i64>,
    status: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let data: serde_json::Value = serde_json::from_str(&self.data)?;
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;
        let attempt_count = u32::try_from(self.attempt_count).map_err(|_| {
            AppError::Database(format!(
                "Job {} has invalid attempt_count {}",
                self.id, self.attempt_count
            ))
        })?;

        Ok(Job {
            id: self.id,
            key: self.key,
            data: JobPayload::new(data),
            metadata: metadata.map(JobPayload::new),
            attempt_count,
            receipt: self.receipt.map(Receipt::new),
            next_visible_at: self.next_visible_at,
            status: self.status.as_deref().map(JobStatus::parse),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}
