//! Bounded pool for request-path analysis work.
//!
//! The sync endpoint runs the analysis function here instead of on the request
//! future: a permit caps how many analyses run at once, and the spawned task
//! keeps running (and cleaning up) if the client goes away.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error("analysis pool is shut down")]
    Closed,

    #[error("analysis task failed: {0}")]
    Join(String),
}

#[derive(Clone)]
pub struct AnalysisPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl AnalysisPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a permit, then runs `fut` on its own task and returns its output.
    ///
    /// Dropping the returned future does not cancel `fut`; the permit is held
    /// until `fut` itself completes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, OffloadError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OffloadError::Closed)?;

        let handle = tokio::spawn(async move {
            let out = fut.await;
            drop(permit);
            out
        });

        handle.await.map_err(|e| OffloadError::Join(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = AnalysisPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut calls = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            calls.push(tokio::spawn(async move {
                pool.run(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for c in calls {
            c.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn work_finishes_after_caller_is_dropped() {
        let pool = AnalysisPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));

        let flag = Arc::clone(&done);
        let caller = tokio::spawn({
            let pool = pool.clone();
            async move {
                pool.run(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    flag.store(1, Ordering::SeqCst);
                })
                .await
            }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn panicking_work_is_reported_not_propagated() {
        let pool = AnalysisPool::new(1);
        let err = pool
            .run(async {
                panic!("boom");
            })
            .await
            .map(|_: ()| ())
            .unwrap_err();
        assert!(matches!(err, OffloadError::Join(_)));
        assert_eq!(pool.available(), 1);
    }
}
