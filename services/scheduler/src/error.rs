use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::policy::TransitionError;

/// Scheduler service error variants.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("schedule not found")]
    ScheduleNotFound,
    #[error("review not found")]
    ReviewNotFound,
    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("missing data")]
    MissingData,
    #[error("invalid max_retries")]
    InvalidMaxRetries,
    /// The persistence layer failed or returned something unreadable.
    #[error("store failure")]
    Store(#[from] anyhow::Error),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl SchedulerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScheduleNotFound => "SCHEDULE_NOT_FOUND",
            Self::ReviewNotFound => "REVIEW_NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::MissingData => "MISSING_DATA",
            Self::InvalidMaxRetries => "INVALID_MAX_RETRIES",
            Self::Store(_) => "STORE_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Display text including the underlying cause chain, for logs and batch reports.
    pub fn detail(&self) -> String {
        match self {
            Self::Store(e) | Self::Internal(e) => format!("{self}: {e:#}"),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ScheduleNotFound | Self::ReviewNotFound => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::MissingData | Self::InvalidMaxRetries => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are already recorded by the trace layer; 5xx need the cause chain.
        if status.is_server_error() {
            tracing::error!(error = %self.detail(), kind = self.kind(), "request failed");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
