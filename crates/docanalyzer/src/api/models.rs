use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::jobs::{Job, JobStatus};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub endpoints: [&'static str; 4],
}

#[derive(Debug, Serialize)]
pub struct SyncAnalysisResponse {
    pub status: &'static str,
    pub query: String,
    pub analysis: String,
    pub file_processed: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: &'static str,
}

/// `GET /analyze/{job_id}`. `analysis` and `error` are present only in
/// their terminal state.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub query: String,
    pub file_processed: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let analysis = match job.status {
            JobStatus::Completed => job.result_text,
            _ => None,
        };
        let error = match job.status {
            JobStatus::Failed => job.error_message,
            _ => None,
        };

        Self {
            job_id: job.id,
            status: job.status,
            query: job.query,
            file_processed: job.original_filename,
            created_at: job.created_at,
            updated_at: job.updated_at,
            analysis,
            error,
        }
    }
}
