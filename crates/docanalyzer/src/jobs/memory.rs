//! In-process store and queue with the same contracts as the postgres ones.
//! Used by the HTTP and worker tests; nothing here survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, NewJob, StatusUpdate};
use crate::jobs::queue::{QueueError, Task, TaskQueue};
use crate::jobs::store::{JobStore, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: NewJob) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.jobs.lock().await.insert(
            id,
            Job {
                id,
                status: JobStatus::Pending,
                file_path: job.file_path,
                original_filename: job.original_filename,
                query: job.query,
                result_text: None,
                error_message: None,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_status(&self, job_id: Uuid, update: StatusUpdate) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;

        let next = update.status();
        if !job.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: job_id,
                from: job.status,
                to: next,
            });
        }

        job.status = next;
        job.result_text = update.result_text().map(str::to_string);
        job.error_message = update.error_message().map(str::to_string);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn get(&self, job_id: Uuid) -> Result<Job, StoreError> {
        self.jobs
            .lock()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn list_recent(
        &self,
        status: Option<JobStatus>,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut out: Vec<Job> = jobs
            .values()
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit.clamp(1, 500) as usize);
        Ok(out)
    }
}

#[derive(Default)]
struct QueueState {
    queued: VecDeque<Task>,
    running: HashMap<Uuid, Task>,
    done: Vec<Uuid>,
}

/// FIFO queue. Leases never expire on their own; `reap_expired` returns every
/// running task to the front, simulating a crashed worker.
#[derive(Default)]
pub struct MemoryTaskQueue {
    state: Mutex<QueueState>,
    unavailable: AtomicBool,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `enqueue` fail, like a broker outage.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub async fn acked(&self) -> Vec<Uuid> {
        self.state.lock().await.done.clone()
    }

    pub async fn queued_tasks(&self) -> Vec<Task> {
        self.state.lock().await.queued.iter().cloned().collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task_name: &str, payload: Value) -> Result<Uuid, QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable("broker connection refused".into()));
        }

        let id = Uuid::new_v4();
        self.state.lock().await.queued.push_back(Task {
            id,
            queue: "memory".into(),
            task_name: task_name.to_string(),
            payload_json: payload,
            deliveries: 0,
            locked_by: None,
            lock_expires_at: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn lease(
        &self,
        worker_id: &str,
        lease_seconds: i64,
    ) -> Result<Option<Task>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(mut task) = state.queued.pop_front() else {
            return Ok(None);
        };

        task.deliveries += 1;
        task.locked_by = Some(worker_id.to_string());
        task.lock_expires_at = Some(Utc::now() + chrono::Duration::seconds(lease_seconds));
        state.running.insert(task.id, task.clone());
        Ok(Some(task))
    }

    async fn ack(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let owned = state
            .running
            .get(&task_id)
            .map(|t| t.locked_by.as_deref() == Some(worker_id))
            .unwrap_or(false);
        if owned {
            state.running.remove(&task_id);
            state.done.push(task_id);
        }
        Ok(())
    }

    async fn reap_expired(&self) -> Result<u64, QueueError> {
        let mut state = self.state.lock().await;
        let reaped: Vec<Task> = state.running.drain().map(|(_, t)| t).collect();
        let n = reaped.len() as u64;
        for mut task in reaped {
            task.locked_by = None;
            task.lock_expires_at = None;
            state.queued.push_front(task);
        }
        Ok(n)
    }

    async fn depth(&self) -> Result<i64, QueueError> {
        Ok(self.state.lock().await.queued.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_job() -> NewJob {
        NewJob {
            query: "Summarize revenue".into(),
            file_path: "/tmp/doc.pdf".into(),
            original_filename: Some("doc.pdf".into()),
        }
    }

    #[tokio::test]
    async fn memory_store_enforces_forward_transitions() {
        let store = MemoryJobStore::new();
        let id = store.create(new_job()).await.unwrap();

        let err = store
            .update_status(
                id,
                StatusUpdate::Completed {
                    result_text: "x".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            }
        ));

        store
            .update_status(id, StatusUpdate::Processing)
            .await
            .unwrap();
        let done = store
            .update_status(
                id,
                StatusUpdate::Completed {
                    result_text: "analysis".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.updated_at >= done.created_at);

        let err = store
            .update_status(
                id,
                StatusUpdate::Failed {
                    error_message: "late".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn memory_store_unknown_job_is_not_found() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(x)) if x == id));
        assert!(matches!(
            store.update_status(id, StatusUpdate::Processing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn memory_queue_redelivers_after_reap() {
        let queue = MemoryTaskQueue::new();
        let id = queue.enqueue("t", json!({"k": 1})).await.unwrap();

        let first = queue.lease("w1", 30).await.unwrap().unwrap();
        assert_eq!(first.id, id);
        assert_eq!(first.deliveries, 1);
        assert!(queue.lease("w2", 30).await.unwrap().is_none());

        assert_eq!(queue.reap_expired().await.unwrap(), 1);
        let second = queue.lease("w2", 30).await.unwrap().unwrap();
        assert_eq!(second.id, id);
        assert_eq!(second.deliveries, 2);

        // stale owner cannot ack
        queue.ack(id, "w1").await.unwrap();
        assert!(queue.acked().await.is_empty());
        queue.ack(id, "w2").await.unwrap();
        assert_eq!(queue.acked().await, vec![id]);
    }
}
