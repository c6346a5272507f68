// crates/docanalyzer/src/jobs/queue.rs
//
// The broker: a postgres table workers lease from. Delivery is at-least-once;
// a worker that dies mid-task loses its lease and the task is handed out again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub const RUN_ANALYSIS_TASK: &str = "docanalyzer.run_analysis";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("bad task payload: {0}")]
    BadPayload(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub queue: String,
    pub task_name: String,
    pub payload_json: Value,
    pub deliveries: i32,
    pub locked_by: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, QueueError> {
        serde_json::from_value(self.payload_json.clone())
            .map_err(|e| QueueError::BadPayload(e.to_string()))
    }
}

/// Payload of [`RUN_ANALYSIS_TASK`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub job_id: Uuid,
    pub file_path: String,
    pub query: String,
    #[serde(default)]
    pub original_filename: Option<String>,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task_name: &str, payload: Value) -> Result<Uuid, QueueError>;

    /// Claims one runnable task for `worker_id` for `lease_seconds`.
    async fn lease(&self, worker_id: &str, lease_seconds: i64)
        -> Result<Option<Task>, QueueError>;

    /// Late acknowledgement: called after the handler finished, success or not.
    async fn ack(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError>;

    /// Puts tasks with expired leases back in line. Returns how many moved.
    async fn reap_expired(&self) -> Result<u64, QueueError>;

    async fn depth(&self) -> Result<i64, QueueError>;
}

#[derive(Clone)]
pub struct PgTaskQueue {
    pool: PgPool,
    queue: String,
}

impl PgTaskQueue {
    pub fn new(pool: PgPool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub async fn purge(&self) -> Result<u64, QueueError> {
        let res = sqlx::query("DELETE FROM task_queue WHERE queue = $1")
            .bind(&self.queue)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn enqueue(&self, task_name: &str, payload: Value) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO task_queue (id, queue, task_name, payload_json, status)
            VALUES ($1, $2, $3, $4, 'queued')
            "#,
        )
        .bind(id)
        .bind(&self.queue)
        .bind(task_name)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    // SELECT ... FOR UPDATE SKIP LOCKED: two workers never claim the same row.
    async fn lease(
        &self,
        worker_id: &str,
        lease_seconds: i64,
    ) -> Result<Option<Task>, QueueError> {
        let mut tx = self.pool.begin().await?;

        let task = sqlx::query_as::<_, Task>(
            r#"
            WITH candidate AS (
              SELECT id
              FROM task_queue
              WHERE queue = $1
                AND status = 'queued'
              ORDER BY created_at ASC
              FOR UPDATE SKIP LOCKED
              LIMIT 1
            )
            UPDATE task_queue t
            SET status = 'running',
                deliveries = t.deliveries + 1,
                locked_by = $2,
                locked_at = now(),
                lock_expires_at = now() + ($3::bigint * interval '1 second'),
                updated_at = now()
            FROM candidate
            WHERE t.id = candidate.id
            RETURNING t.id, t.queue, t.task_name, t.payload_json, t.deliveries,
                      t.locked_by, t.lock_expires_at, t.created_at
            "#,
        )
        .bind(&self.queue)
        .bind(worker_id)
        .bind(lease_seconds)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// The `locked_by` guard keeps a worker whose lease was reaped from
    /// acknowledging a task that now belongs to someone else.
    async fn ack(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            UPDATE task_queue
            SET status = 'done',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
              AND locked_by = $2
            "#,
        )
        .bind(task_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reap_expired(&self) -> Result<u64, QueueError> {
        let res = sqlx::query(
            r#"
            UPDATE task_queue
            SET status = 'queued',
                locked_at = NULL,
                locked_by = NULL,
                lock_expires_at = NULL,
                updated_at = now()
            WHERE queue = $1
              AND status = 'running'
              AND lock_expires_at IS NOT NULL
              AND lock_expires_at < now()
            "#,
        )
        .bind(&self.queue)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    async fn depth(&self) -> Result<i64, QueueError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_queue WHERE queue = $1 AND status = 'queued'",
        )
        .bind(&self.queue)
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}
