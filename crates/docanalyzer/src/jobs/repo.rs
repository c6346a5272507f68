// crates/docanalyzer/src/jobs/repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{Job, JobRow, JobStatus, NewJob, StatusUpdate};
use crate::jobs::store::{JobStore, StoreError};

/// Postgres-backed job record store over the `analysis_jobs` table.
#[derive(Clone)]
pub struct JobsRepo {
    pool: PgPool,
}

impl JobsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM analysis_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        status
            .map(|s| {
                JobStatus::parse(&s)
                    .ok_or_else(|| StoreError::Storage(format!("unknown job status {s:?}")))
            })
            .transpose()
    }

    /// Removes every job row. Admin/test helper.
    pub async fn truncate(&self) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM analysis_jobs")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

fn into_job(row: JobRow) -> Result<Job, StoreError> {
    Job::try_from(row).map_err(StoreError::Storage)
}

#[async_trait]
impl JobStore for JobsRepo {
    async fn create(&self, job: NewJob) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO analysis_jobs (id, status, file_path, original_filename, query, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            "#,
        )
        .bind(id)
        .bind(JobStatus::Pending.as_str())
        .bind(&job.file_path)
        .bind(&job.original_filename)
        .bind(&job.query)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// The `status = ANY(...)` guard makes the transition a single atomic
    /// compare-and-set, so two writers can never both win the same step.
    async fn update_status(&self, job_id: Uuid, update: StatusUpdate) -> Result<Job, StoreError> {
        let next = update.status();
        let allowed: Vec<String> = next
            .allowed_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE analysis_jobs
            SET status = $2,
                result_text = $3,
                error_message = $4,
                updated_at = now()
            WHERE id = $1
              AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(next.as_str())
        .bind(update.result_text())
        .bind(update.error_message())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => into_job(row),
            None => match self.current_status(job_id).await? {
                None => Err(StoreError::NotFound(job_id)),
                Some(from) => Err(StoreError::InvalidTransition {
                    id: job_id,
                    from,
                    to: next,
                }),
            },
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM analysis_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => into_job(row),
            None => Err(StoreError::NotFound(job_id)),
        }
    }

    async fn list_recent(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let limit = limit.clamp(1, 500);

        let rows = match status {
            Some(st) => {
                sqlx::query_as::<_, JobRow>(
                    r#"
                    SELECT *
                    FROM analysis_jobs
                    WHERE status = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(st.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>(
                    r#"
                    SELECT *
                    FROM analysis_jobs
                    ORDER BY created_at DESC, id DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(into_job).collect()
    }
}
