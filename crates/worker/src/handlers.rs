use docanalyzer::jobs::{AnalysisRunner, AnalysisTask, RunOutcome, Task, RUN_ANALYSIS_TASK};
use serde::Deserialize;
use std::{collections::HashMap, pin::Pin, sync::Arc};
use tokio::sync::Semaphore;

pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
type HandlerFn = dyn for<'a> Fn(&'a Task, &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>>
    + Send
    + Sync;

#[derive(Debug)]
pub struct TaskError {
    pub code: &'static str,
    pub message: String,
    /// Leave the task un-acked so it comes back once the lease expires.
    pub redeliver: bool,
}

impl TaskError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            redeliver: false,
        }
    }

    pub fn redeliver(mut self) -> Self {
        self.redeliver = true;
        self
    }
}

#[derive(Clone)]
pub struct TaskContext {
    pub runner: AnalysisRunner,
    pub worker_id: String,
}

#[derive(Clone)]
pub struct HandlerEntry {
    pub handler: Arc<HandlerFn>,
    pub semaphore: Option<Arc<Semaphore>>,
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_with_limit<F>(
        &mut self,
        task_name: &str,
        handler: F,
        max_concurrency: Option<usize>,
    ) where
        F: for<'a> Fn(&'a Task, &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>>
            + Send
            + Sync
            + 'static,
    {
        let semaphore = max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self.handlers.insert(
            task_name.to_string(),
            HandlerEntry {
                handler: Arc::new(handler),
                semaphore,
            },
        );
    }

    pub fn handler_for(&self, task_name: &str) -> Option<HandlerEntry> {
        self.handlers.get(task_name).cloned()
    }
}

impl HandlerEntry {
    pub async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<(), TaskError> {
        let _permit = match &self.semaphore {
            Some(sem) => Some(sem.clone().acquire_owned().await.map_err(|_| {
                TaskError::new("WORKER_SHUTDOWN", "handler semaphore closed").redeliver()
            })?),
            None => None,
        };

        (self.handler)(task, ctx).await
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(task: &Task) -> Result<T, TaskError> {
    task.payload()
        .map_err(|e| TaskError::new("BAD_PAYLOAD", e.to_string()))
}

fn boxed<'a, T>(fut: impl std::future::Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}

async fn run_analysis(task: &Task, ctx: &TaskContext) -> Result<(), TaskError> {
    let payload: AnalysisTask = parse_payload(task)?;
    tracing::info!(
        worker_id = %ctx.worker_id,
        job_id = %payload.job_id,
        deliveries = task.deliveries,
        "running analysis"
    );

    match ctx.runner.run(&payload).await {
        Ok(RunOutcome::Skipped) => {
            tracing::debug!(job_id = %payload.job_id, "nothing to do");
            Ok(())
        }
        // a failed analysis is recorded on the job row; the delivery itself is done
        Ok(RunOutcome::Completed) | Ok(RunOutcome::Failed(_)) => Ok(()),
        Err(e) => Err(TaskError::new("STORE_UNAVAILABLE", e.to_string()).redeliver()),
    }
}

pub fn build_registry(analysis_concurrency: Option<usize>) -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();

    registry.register_with_limit(
        RUN_ANALYSIS_TASK,
        |task, ctx| boxed(run_analysis(task, ctx)),
        analysis_concurrency,
    );

    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, task};
    use docanalyzer::jobs::{JobStatus, JobStore, MemoryJobStore, NewJob};
    use serde_json::json;

    #[tokio::test]
    async fn malformed_payload_is_not_redelivered() {
        let registry = build_registry(None);
        let ctx = context(Arc::new(MemoryJobStore::new()));
        let entry = registry.handler_for(RUN_ANALYSIS_TASK).unwrap();

        let err = entry
            .run(&task(RUN_ANALYSIS_TASK, json!({"nope": true})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, "BAD_PAYLOAD");
        assert!(!err.redeliver);
    }

    #[tokio::test]
    async fn unknown_task_names_have_no_handler() {
        let registry = build_registry(Some(1));
        assert!(registry.handler_for("email_send").is_none());
    }

    #[tokio::test]
    async fn missing_upload_fails_the_job_but_completes_delivery() {
        let store = Arc::new(MemoryJobStore::new());
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("gone.pdf").to_string_lossy().to_string();
        let job_id = store
            .create(NewJob {
                query: "q".into(),
                file_path: file_path.clone(),
                original_filename: None,
            })
            .await
            .unwrap();

        let registry = build_registry(Some(2));
        let ctx = context(store.clone());
        let payload = json!({"job_id": job_id, "file_path": file_path, "query": "q"});

        registry
            .handler_for(RUN_ANALYSIS_TASK)
            .unwrap()
            .run(&task(RUN_ANALYSIS_TASK, payload), &ctx)
            .await
            .unwrap();

        let job = store.get(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().starts_with("File not found:"));
    }
}
