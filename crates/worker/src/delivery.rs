use std::time::Instant;

use docanalyzer::jobs::{Task, TaskQueue};

use crate::handlers::{HandlerRegistry, TaskContext, TaskError};

/// Runs one leased task and acknowledges it afterwards (late ack).
///
/// Returns whether the task was acked. A handler error flagged `redeliver`
/// leaves the lease to expire so the task is handed out again.
pub async fn execute(
    task: Task,
    registry: &HandlerRegistry,
    ctx: &TaskContext,
    queue: &dyn TaskQueue,
) -> bool {
    let start = Instant::now();

    let result: Result<(), TaskError> = match registry.handler_for(&task.task_name) {
        Some(entry) => entry.run(&task, ctx).await,
        None => Err(TaskError::new(
            "UNKNOWN_TASK",
            format!("no handler for task_name={}", task.task_name),
        )),
    };

    let latency_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => tracing::info!(latency_ms, "task done"),
        Err(err) if err.redeliver => {
            tracing::warn!(
                code = err.code,
                error = %err.message,
                latency_ms,
                "task left for redelivery"
            );
            return false;
        }
        Err(err) => tracing::error!(
            code = err.code,
            error = %err.message,
            latency_ms,
            "task dropped"
        ),
    }

    if let Err(e) = queue.ack(task.id, &ctx.worker_id).await {
        // the lease will expire and the task comes back; handlers tolerate that
        tracing::warn!(error = %e, "ack failed");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::build_registry;
    use crate::testing::{context, WORKER_ID};
    use async_trait::async_trait;
    use docanalyzer::jobs::{
        Job, JobStatus, JobStore, MemoryJobStore, MemoryTaskQueue, NewJob, StatusUpdate,
        StoreError, RUN_ANALYSIS_TASK,
    };
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    struct DownStore;

    #[async_trait]
    impl JobStore for DownStore {
        async fn create(&self, _: NewJob) -> Result<Uuid, StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }

        async fn update_status(&self, _: Uuid, _: StatusUpdate) -> Result<Job, StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }

        async fn get(&self, _: Uuid) -> Result<Job, StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }

        async fn list_recent(
            &self,
            _: Option<JobStatus>,
            _: i64,
        ) -> Result<Vec<Job>, StoreError> {
            Err(StoreError::Storage("connection refused".into()))
        }
    }

    async fn lease_one(
        queue: &MemoryTaskQueue,
        task_name: &str,
        payload: serde_json::Value,
    ) -> Task {
        queue.enqueue(task_name, payload).await.unwrap();
        queue.lease(WORKER_ID, 60).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn finished_task_is_acked() {
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

        let queue = MemoryTaskQueue::new();
        let task = lease_one(
            &queue,
            RUN_ANALYSIS_TASK,
            json!({"job_id": job_id, "file_path": file_path, "query": "q"}),
        )
        .await;
        let task_id = task.id;

        let ctx = context(store.clone());
        let acked = execute(task, &build_registry(Some(1)), &ctx, &queue).await;

        assert!(acked);
        assert_eq!(queue.acked().await, vec![task_id]);
        assert_eq!(store.get(job_id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_task_is_acked_and_dropped() {
        let queue = MemoryTaskQueue::new();
        let task = lease_one(&queue, "email_send", json!({})).await;
        let task_id = task.id;

        let ctx = context(Arc::new(MemoryJobStore::new()));
        let acked = execute(task, &build_registry(None), &ctx, &queue).await;

        assert!(acked);
        assert_eq!(queue.acked().await, vec![task_id]);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_outage_leaves_task_for_redelivery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kept.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let queue = MemoryTaskQueue::new();
        let task = lease_one(
            &queue,
            RUN_ANALYSIS_TASK,
            json!({
                "job_id": Uuid::new_v4(),
                "file_path": path.to_string_lossy(),
                "query": "q"
            }),
        )
        .await;

        let ctx = context(Arc::new(DownStore));
        let acked = execute(task, &build_registry(None), &ctx, &queue).await;

        assert!(!acked);
        assert!(queue.acked().await.is_empty());
        assert!(path.exists());

        assert_eq!(queue.reap_expired().await.unwrap(), 1);
        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
