//! Shared fixtures for the worker's unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use docanalyzer::analysis::{AnalysisAgent, PdfTextExtractor};
use docanalyzer::jobs::{AnalysisRunner, JobStore, Task};
use docanalyzer::{AnalysisError, DocumentAnalyzer};
use uuid::Uuid;

use crate::handlers::TaskContext;

pub const WORKER_ID: &str = "test-worker";

pub struct NeverCalled;

#[async_trait]
impl AnalysisAgent for NeverCalled {
    async fn produce_analysis(&self, _: &str, _: &str) -> Result<String, AnalysisError> {
        Err(AnalysisError::analysis("agent should not run"))
    }

    fn name(&self) -> &str {
        "never"
    }

    fn model(&self) -> &str {
        "none"
    }
}

pub fn context(store: Arc<dyn JobStore>) -> TaskContext {
    let analyzer = DocumentAnalyzer::new(
        Arc::new(PdfTextExtractor::new()),
        Arc::new(NeverCalled),
        1000,
    );
    TaskContext {
        runner: AnalysisRunner::new(store, Arc::new(analyzer), None),
        worker_id: WORKER_ID.into(),
    }
}

pub fn task(task_name: &str, payload: serde_json::Value) -> Task {
    Task {
        id: Uuid::new_v4(),
        queue: "analysis".into(),
        task_name: task_name.into(),
        payload_json: payload,
        deliveries: 1,
        locked_by: Some(WORKER_ID.into()),
        lock_expires_at: None,
        created_at: Utc::now(),
    }
}
