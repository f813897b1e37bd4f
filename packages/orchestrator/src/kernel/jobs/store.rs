//! Durable job/task store (C1).
//!
//! `PgJobTaskStore` is the single writer-facing surface for job and task
//! state. Every mutation goes through here; workers never touch Postgres
//! directly (see module docs on [`crate::kernel::jobs`]).

use async_trait::async_trait;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{Job, JobCounters, JobKind, JobStatus, NewTask, Task, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task {0} is not in the expected state for this operation")]
    InvalidState(String),
    #[error("job {0} not found")]
    JobNotFound(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters accepted by [`JobTaskStore::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub client_id: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub limit: i64,
}

/// Read-only snapshot of a job's progress, derived from its tasks.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub status: JobStatus,
    pub total: i64,
    pub pending: i64,
    pub leased: i64,
    pub done: i64,
    pub error: i64,
    pub cancelled: i64,
}

/// The store's contract, abstracted so the router and reaper can be
/// exercised against an in-memory double in tests (see
/// [`super::memory_store::InMemoryJobTaskStore`]) without a live
/// Postgres instance.
#[async_trait]
pub trait JobTaskStore: Send + Sync {
    async fn create_job(
        &self,
        client_id: Uuid,
        kind: JobKind,
        priority: i16,
        correlation_id: Option<String>,
    ) -> StoreResult<Job>;

    async fn create_tasks(&self, job_id: Uuid, tasks: Vec<NewTask>) -> StoreResult<usize>;

    async fn claim_next(
        &self,
        account_hint: &str,
        kinds: &[String],
        worker_id: &str,
        lease_ttl: Duration,
    ) -> StoreResult<Option<Task>>;

    async fn mark_done(&self, task_id: &str, result: Option<Json>) -> StoreResult<()>;

    async fn mark_error(&self, task_id: &str, error: &str, terminal: bool) -> StoreResult<()>;

    async fn requeue_task_with_attempts_cap(
        &self,
        task_id: &str,
        reason: &str,
        max_attempts: i32,
    ) -> StoreResult<bool>;

    async fn reclaim_expired_leases(&self, max_n: i64) -> StoreResult<i64>;

    async fn list_jobs(&self, filters: JobFilters) -> StoreResult<Vec<Job>>;

    async fn job_progress(&self, job_id: Uuid) -> StoreResult<JobProgress>;

    async fn all_tasks_finished(&self, job_id: Uuid) -> StoreResult<bool>;

    async fn cancel_job(&self, job_id: Uuid) -> StoreResult<()>;

    async fn sync_job_completion(&self, job_id: Uuid) -> StoreResult<()>;
}

pub struct PgJobTaskStore {
    pool: PgPool,
}

impl PgJobTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retries transient connection errors with bounded exponential
    /// backoff. Persistent errors (constraint violations, bad SQL) are
    /// surfaced immediately — only the "pool exhausted" / "connection
    /// reset" shape of failure is worth retrying here.
    async fn with_retry<T, F, Fut>(op_name: &'static str, mut f: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < 3 && is_transient(&e) => {
                    attempt += 1;
                    let backoff = Duration::from_millis(50 * 2u64.pow(attempt));
                    warn!(op = op_name, attempt, error = %e, "transient store error, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed)
}

#[async_trait]
impl JobTaskStore for PgJobTaskStore {
    async fn create_job(
        &self,
        client_id: Uuid,
        kind: JobKind,
        priority: i16,
        correlation_id: Option<String>,
    ) -> StoreResult<Job> {
        let pool = self.pool.clone();
        let kind_str = kind.as_str().to_string();
        let correlation_id2 = correlation_id.clone();
        Self::with_retry("create_job", move || {
            let pool = pool.clone();
            let kind_str = kind_str.clone();
            let correlation_id = correlation_id2.clone();
            async move {
                sqlx::query_as::<_, Job>(
                    r#"
                    INSERT INTO jobs (id, client_id, kind, priority, status, correlation_id, counters)
                    VALUES (gen_random_uuid(), $1, $2, $3, 'pending', $4, '{"total":0,"finished":0,"errored":0}')
                    RETURNING id, client_id, kind, priority, status, created_at, updated_at, correlation_id, counters
                    "#,
                )
                .bind(client_id)
                .bind(&kind_str)
                .bind(priority)
                .bind(&correlation_id)
                .fetch_one(&pool)
                .await
            }
        })
        .await
    }

    async fn create_tasks(&self, job_id: Uuid, tasks: Vec<NewTask>) -> StoreResult<usize> {
        if tasks.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for t in &tasks {
            let id = Task::make_id(job_id, &t.kind, &t.target);
            let res = sqlx::query(
                r#"
                INSERT INTO job_tasks
                    (id, job_id, kind, target, payload, status, attempts, max_attempts,
                     lease_ttl_seconds, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7, NOW(), NOW())
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(job_id)
            .bind(&t.kind)
            .bind(&t.target)
            .bind(sqlx::types::Json(&t.payload))
            .bind(t.max_attempts)
            .bind(t.lease_ttl_seconds)
            .execute(&mut *tx)
            .await?;
            if res.rows_affected() > 0 {
                inserted += 1;
            }
        }
        sqlx::query(
            r#"
            UPDATE jobs SET
                counters = jsonb_set(counters, '{total}', to_jsonb((counters->>'total')::int + $2)),
                status = CASE WHEN status = 'pending' THEN 'running' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(inserted as i32)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn claim_next(
        &self,
        account_hint: &str,
        kinds: &[String],
        worker_id: &str,
        lease_ttl: Duration,
    ) -> StoreResult<Option<Task>> {
        let ttl_secs = lease_ttl.as_secs() as i64;
        let pool = self.pool.clone();
        let account_hint = account_hint.to_string();
        let worker_id = worker_id.to_string();
        let kinds = kinds.to_vec();
        let task = Self::with_retry("claim_next", move || {
            let pool = pool.clone();
            let account_hint = account_hint.clone();
            let worker_id = worker_id.clone();
            let kinds = kinds.clone();
            async move {
                sqlx::query_as::<_, Task>(
                    r#"
                    WITH candidate AS (
                        SELECT jt.id
                        FROM job_tasks jt
                        JOIN jobs j ON j.id = jt.job_id
                        WHERE jt.status = 'pending'
                          AND jt.kind = ANY($1)
                          AND j.status NOT IN ('cancelled', 'done', 'failed')
                        ORDER BY j.priority DESC, jt.created_at ASC
                        LIMIT 1
                        FOR UPDATE OF jt SKIP LOCKED
                    )
                    UPDATE job_tasks
                    SET status = 'leased',
                        leased_by = $2,
                        leased_at = NOW(),
                        lease_expires_at = NOW() + ($3 || ' seconds')::interval,
                        attempts = attempts + 1,
                        updated_at = NOW()
                    WHERE id IN (SELECT id FROM candidate)
                    RETURNING id, job_id, kind, target, payload, status, attempts, max_attempts,
                              last_error, leased_by, leased_at, lease_expires_at, lease_ttl_seconds,
                              created_at, updated_at
                    "#,
                )
                .bind(&kinds)
                .bind(&worker_id)
                .bind(ttl_secs)
                .fetch_optional(&pool)
                .await
            }
        })
        .await?;
        if task.is_some() {
            debug!(worker_id, account_hint, "claimed task");
        }
        Ok(task)
    }

    async fn mark_done(&self, task_id: &str, result: Option<Json>) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE job_tasks
            SET status = 'done',
                leased_by = NULL,
                leased_at = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'leased'
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::InvalidState(task_id.to_string()));
        }
        let _ = result; // result payload intentionally not persisted on the row; see DESIGN.md
        Ok(())
    }

    async fn mark_error(&self, task_id: &str, error: &str, terminal: bool) -> StoreResult<()> {
        if terminal {
            sqlx::query(
                r#"
                UPDATE job_tasks
                SET status = 'error',
                    leased_by = NULL,
                    leased_at = NULL,
                    lease_expires_at = NULL,
                    last_error = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'leased'
                "#,
            )
            .bind(task_id)
            .bind(truncate_error(error))
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE job_tasks
                SET status = 'pending',
                    leased_by = NULL,
                    leased_at = NULL,
                    lease_expires_at = NULL,
                    last_error = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'leased'
                "#,
            )
            .bind(task_id)
            .bind(truncate_error(error))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn requeue_task_with_attempts_cap(
        &self,
        task_id: &str,
        reason: &str,
        max_attempts: i32,
    ) -> StoreResult<bool> {
        let requeued = sqlx::query_scalar::<_, Option<String>>(
            r#"
            UPDATE job_tasks
            SET status = CASE WHEN attempts < $2 THEN 'pending' ELSE 'error' END,
                leased_by = CASE WHEN attempts < $2 THEN NULL ELSE leased_by END,
                leased_at = CASE WHEN attempts < $2 THEN NULL ELSE leased_at END,
                lease_expires_at = CASE WHEN attempts < $2 THEN NULL ELSE lease_expires_at END,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'leased'
            RETURNING status::text
            "#,
        )
        .bind(task_id)
        .bind(max_attempts)
        .bind(truncate_error(reason))
        .fetch_optional(&self.pool)
        .await?;

        match requeued.flatten() {
            Some(status) => Ok(status == "pending"),
            None => Err(StoreError::InvalidState(task_id.to_string())),
        }
    }

    async fn reclaim_expired_leases(&self, max_n: i64) -> StoreResult<i64> {
        let rows = sqlx::query(
            r#"
            WITH expired AS (
                SELECT id FROM job_tasks
                WHERE status = 'leased' AND lease_expires_at < NOW()
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE job_tasks
            SET status = 'pending',
                leased_by = NULL,
                leased_at = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM expired)
            "#,
        )
        .bind(max_n)
        .execute(&self.pool)
        .await?;
        Ok(rows.rows_affected() as i64)
    }

    async fn list_jobs(&self, filters: JobFilters) -> StoreResult<Vec<Job>> {
        let limit = if filters.limit > 0 { filters.limit } else { 100 };
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, client_id, kind, priority, status, created_at, updated_at, correlation_id, counters
            FROM jobs
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::text IS NULL OR status::text = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(filters.client_id)
        .bind(filters.status.map(job_status_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn job_progress(&self, job_id: Uuid) -> StoreResult<JobProgress> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT id, client_id, kind, priority, status, created_at, updated_at, correlation_id, counters FROM jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::JobNotFound(job_id))?;

        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*)::bigint,
                COUNT(*) FILTER (WHERE status = 'pending')::bigint,
                COUNT(*) FILTER (WHERE status = 'leased')::bigint,
                COUNT(*) FILTER (WHERE status = 'done')::bigint,
                COUNT(*) FILTER (WHERE status = 'error')::bigint,
                COUNT(*) FILTER (WHERE status = 'cancelled')::bigint
            FROM job_tasks WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobProgress {
            job_id,
            client_id: job.client_id,
            status: job.status,
            total: row.0,
            pending: row.1,
            leased: row.2,
            done: row.3,
            error: row.4,
            cancelled: row.5,
        })
    }

    async fn all_tasks_finished(&self, job_id: Uuid) -> StoreResult<bool> {
        let unfinished: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_tasks WHERE job_id = $1 AND status IN ('pending', 'leased')",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(unfinished == 0)
    }

    async fn cancel_job(&self, job_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE jobs SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE job_tasks SET status = 'cancelled', updated_at = NOW() WHERE job_id = $1 AND status = 'pending'",
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn sync_job_completion(&self, job_id: Uuid) -> StoreResult<()> {
        let progress = self.job_progress(job_id).await?;
        if matches!(progress.status, JobStatus::Cancelled) {
            return Ok(());
        }
        if progress.pending + progress.leased > 0 {
            return Ok(());
        }
        let final_status = if progress.error > 0 { "failed" } else { "done" };
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = $2::text,
                counters = jsonb_build_object('total', $3::int, 'finished', $4::int, 'errored', $5::int),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(final_status)
        .bind(progress.total as i32)
        .bind((progress.done + progress.error + progress.cancelled) as i32)
        .bind(progress.error as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Done => "done",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

/// Last-error strings are bounded per spec.md §3 ("last error (string,
/// bounded)") so a runaway stack trace from a use-case can't blow out the
/// row. Truncates on a char boundary, not a byte offset, since an
/// arbitrary use-case error string may contain multi-byte UTF-8.
fn truncate_error(s: &str) -> String {
    const MAX: usize = 2000;
    if s.len() <= MAX {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= MAX)
        .last()
        .unwrap_or(0);
    format!("{}...", &s[..cut])
}
