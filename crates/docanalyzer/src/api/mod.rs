use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::analysis::DocumentAnalyzer;
use crate::jobs::{
    normalize_query, AnalysisTask, JobStatus, JobStore, NewJob, QueueError, StatusUpdate,
    TaskQueue, RUN_ANALYSIS_TASK,
};
use crate::offload::AnalysisPool;
use crate::uploads::UploadDir;

pub mod error;
pub mod models;


pub use error::ApiError;
use models::{JobStatusResponse, RootResponse, SubmitResponse, SyncAnalysisResponse};

const PDF_REQUIRED: &str = "A PDF file is required.";

#[derive(Clone)]
pub struct ApiState {
    pub jobs: Arc<dyn JobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub analyzer: Arc<DocumentAnalyzer>,
    pub pool: AnalysisPool,
    pub uploads: UploadDir,
    pub max_upload_bytes: usize,
}

pub fn router(state: ApiState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze", post(submit_analysis))
        .route("/analyze/sync", post(analyze_sync))
        .route("/analyze/:job_id", get(job_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Financial Document Analyzer API is running",
        endpoints: [
            "POST /analyze/sync",
            "POST /analyze",
            "GET /analyze/{job_id}",
            "GET /health",
        ],
    })
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

struct UploadForm {
    filename: String,
    bytes: Bytes,
    query: String,
}

fn multipart_err(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

// Fields: `file` (required, *.pdf) and `query` (optional).
async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut file: Option<(Option<String>, Bytes)> = None;
    let mut query: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_err)?;
                file = Some((filename, bytes));
            }
            Some("query") => {
                query = Some(field.text().await.map_err(multipart_err)?);
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(ApiError::BadRequest(PDF_REQUIRED.into()));
    };
    let filename = filename
        .filter(|name| name.to_lowercase().ends_with(".pdf"))
        .ok_or_else(|| ApiError::BadRequest(PDF_REQUIRED.into()))?;

    Ok(UploadForm {
        filename,
        bytes,
        query: normalize_query(query.as_deref()),
    })
}

/// Runs the analysis on the bounded pool and answers inline.
/// The upload is deleted on every path, including a dropped connection.
pub async fn analyze_sync(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<SyncAnalysisResponse>, ApiError> {
    let form = read_upload_form(multipart).await?;

    let upload = state
        .uploads
        .save(&form.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save file: {e}")))?;

    let analyzer = Arc::clone(&state.analyzer);
    let query = form.query.clone();
    let result = state
        .pool
        .run(async move {
            let res = analyzer.analyze(upload.path(), &query).await;
            upload.cleanup().await;
            res
        })
        .await
        .map_err(|e| ApiError::Internal(format!("Error processing document: {e}")))?;

    let analysis = result.map_err(ApiError::from_analysis)?;

    Ok(Json(SyncAnalysisResponse {
        status: "success",
        query: form.query,
        analysis,
        file_processed: form.filename,
    }))
}

async fn enqueue_analysis(queue: &dyn TaskQueue, task: &AnalysisTask) -> Result<Uuid, QueueError> {
    let payload =
        serde_json::to_value(task).map_err(|e| QueueError::BadPayload(e.to_string()))?;
    queue.enqueue(RUN_ANALYSIS_TASK, payload).await
}

/// Creates a `pending` job, hands the upload to the queue and returns at once.
pub async fn submit_analysis(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Json<SubmitResponse>, ApiError> {
    let form = read_upload_form(multipart).await?;

    let upload = state
        .uploads
        .save(&form.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save file: {e}")))?;
    let file_path = upload.path().to_string_lossy().to_string();

    let job_id = state
        .jobs
        .create(NewJob {
            query: form.query.clone(),
            file_path: file_path.clone(),
            original_filename: Some(form.filename.clone()),
        })
        .await?;

    let task = AnalysisTask {
        job_id,
        file_path,
        query: form.query,
        original_filename: Some(form.filename),
    };

    match enqueue_analysis(state.queue.as_ref(), &task).await {
        Ok(task_id) => {
            // the worker owns the file from here on
            let _ = upload.into_path();
            tracing::info!(%job_id, %task_id, "analysis queued");

            Ok(Json(SubmitResponse {
                job_id,
                status: JobStatus::Pending,
                message: "Analysis queued. Poll GET /analyze/{job_id} for result.",
            }))
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "enqueue failed");

            let failed = StatusUpdate::Failed {
                error_message: format!("Failed to enqueue: {e}"),
            };
            if let Err(store_err) = state.jobs.update_status(job_id, failed).await {
                tracing::error!(%job_id, error = %store_err, "could not mark job failed");
            }
            upload.cleanup().await;

            Err(ApiError::QueueUnavailable(
                "Queue unavailable; try /analyze/sync".into(),
            ))
        }
    }
}

pub async fn job_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job_id = Uuid::parse_str(job_id.trim())
        .map_err(|_| ApiError::NotFound("Job not found".into()))?;

    let job = state.jobs.get(job_id).await?;
    Ok(Json(job.into()))
}
