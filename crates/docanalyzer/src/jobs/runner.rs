use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::analysis::DocumentAnalyzer;
use crate::jobs::model::{JobStatus, StatusUpdate};
use crate::jobs::queue::AnalysisTask;
use crate::jobs::store::{JobStore, StoreError};
use crate::uploads::remove_upload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    /// Job was already terminal, or its row is gone, or another delivery
    /// recorded a result first. Nothing new was written.
    Skipped,
}

/// Executes one analysis task against the job store.
///
/// This is the only writer of `processing`, `completed` and `failed` for jobs
/// that were enqueued successfully.
#[derive(Clone)]
pub struct AnalysisRunner {
    jobs: Arc<dyn JobStore>,
    analyzer: Arc<DocumentAnalyzer>,
    analysis_timeout: Option<Duration>,
}

impl AnalysisRunner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        analyzer: Arc<DocumentAnalyzer>,
        analysis_timeout: Option<Duration>,
    ) -> Self {
        Self {
            jobs,
            analyzer,
            analysis_timeout,
        }
    }

    /// `Err` means the store could not record progress. The upload is kept in
    /// that case so a redelivery can still run.
    pub async fn run(&self, task: &AnalysisTask) -> Result<RunOutcome, StoreError> {
        let job_id = task.job_id;
        let path = Path::new(&task.file_path);

        if !self.begin(job_id).await? {
            remove_upload(path).await;
            return Ok(RunOutcome::Skipped);
        }

        let start = Instant::now();
        let result = self.analyze(path, &task.query).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (update, outcome) = match result {
            Ok(text) => (
                StatusUpdate::Completed { result_text: text },
                RunOutcome::Completed,
            ),
            Err(message) => (
                StatusUpdate::Failed {
                    error_message: message.clone(),
                },
                RunOutcome::Failed(message),
            ),
        };

        match self.jobs.update_status(job_id, update).await {
            Ok(_) => {}
            // another delivery of the same task finished first and its result stands
            Err(StoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
                tracing::info!(
                    %job_id,
                    status = %from,
                    latency_ms,
                    "job finished by another delivery; dropping result"
                );
                remove_upload(path).await;
                return Ok(RunOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }

        match &outcome {
            RunOutcome::Failed(message) => {
                tracing::warn!(%job_id, latency_ms, error = %message, "job failed")
            }
            _ => tracing::info!(%job_id, latency_ms, "job completed"),
        }

        remove_upload(path).await;
        Ok(outcome)
    }

    // true when the analysis should run.
    async fn begin(&self, job_id: Uuid) -> Result<bool, StoreError> {
        match self.jobs.update_status(job_id, StatusUpdate::Processing).await {
            Ok(_) => Ok(true),
            Err(StoreError::InvalidTransition {
                from: JobStatus::Processing,
                ..
            }) => {
                tracing::info!(%job_id, "redelivered job still processing; running again");
                Ok(true)
            }
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::info!(%job_id, status = %from, "job already finished; skipping");
                Ok(false)
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(%job_id, "task references unknown job; skipping");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn analyze(&self, path: &Path, query: &str) -> Result<String, String> {
        let fut = self.analyzer.analyze(path, query);
        match self.analysis_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(res) => res.map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "Analysis timed out after {}s",
                    limit.as_secs_f64()
                )),
            },
            None => fut.await.map_err(|e| e.to_string()),
        }
    }
}
