use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::analysis::AnalysisError;
use crate::jobs::StoreError;

use super::models::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Analysis(String),

    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    QueueUnavailable(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Analysis(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Analysis(_) => "analysis_failed",
            ApiError::Storage(_) => "storage_unavailable",
            ApiError::QueueUnavailable(_) => "queue_unavailable",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Sync endpoint mapping: bad documents are the caller's fault, the rest is ours.
    pub fn from_analysis(e: AnalysisError) -> Self {
        let detail = format!("Error processing document: {e}");
        match e {
            AnalysisError::Input(_) => ApiError::BadRequest(detail),
            AnalysisError::Analysis(_) => ApiError::Analysis(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound("Job not found".into()),
            StoreError::InvalidTransition { .. } => ApiError::Internal(e.to_string()),
            StoreError::Storage(msg) => ApiError::Storage(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }

        (
            status,
            Json(ErrorBody {
                error: self.code(),
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
