use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_QUERY: &str = "Analyze this financial document for investment insights";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// States a job may be in right before moving to `self`.
    ///
    /// Forward-only: nothing leaves a terminal state, and `processing` is entered once.
    pub fn allowed_predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[JobStatus::Pending],
            JobStatus::Completed => &[JobStatus::Processing],
            JobStatus::Failed => &[JobStatus::Pending, JobStatus::Processing],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub file_path: String,
    pub original_filename: Option<String>,
    pub query: String,
    pub result_text: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `analysis_jobs` row; status is validated on the way into [`Job`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct JobRow {
    pub id: Uuid,
    pub status: String,
    pub file_path: String,
    pub original_filename: Option<String>,
    pub query: String,
    pub result_text: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = String;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown job status {:?} for job {}", row.status, row.id))?;

        Ok(Job {
            id: row.id,
            status,
            file_path: row.file_path,
            original_filename: row.original_filename,
            query: row.query,
            result_text: row.result_text,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub query: String,
    pub file_path: String,
    pub original_filename: Option<String>,
}

/// A state transition written by the worker (or by submission when enqueueing fails).
///
/// Carrying the payload inside the variant keeps result and error mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Processing,
    Completed { result_text: String },
    Failed { error_message: String },
}

impl StatusUpdate {
    pub fn status(&self) -> JobStatus {
        match self {
            StatusUpdate::Processing => JobStatus::Processing,
            StatusUpdate::Completed { .. } => JobStatus::Completed,
            StatusUpdate::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn result_text(&self) -> Option<&str> {
        match self {
            StatusUpdate::Completed { result_text } => Some(result_text),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            StatusUpdate::Failed { error_message } => Some(error_message),
            _ => None,
        }
    }
}

/// Trims the client query and falls back to the default analysis prompt.
pub fn normalize_query(query: Option<&str>) -> String {
    match query.map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => DEFAULT_QUERY.to_string(),
    }
}
