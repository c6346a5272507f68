use async_trait::async_trait;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, StatusUpdate};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Canonical owner of job lifecycle state.
///
/// Implementations must accept concurrent writers on distinct job ids.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a `pending` row with a fresh id. All-or-nothing.
    async fn create(&self, job: NewJob) -> Result<Uuid, StoreError>;

    /// Applies a forward transition and refreshes `updated_at`.
    async fn update_status(&self, job_id: Uuid, update: StatusUpdate) -> Result<Job, StoreError>;

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError>;

    /// Most recent jobs first, optionally filtered by status.
    async fn list_recent(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError>;
}
