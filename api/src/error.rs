//! Error taxonomy shared by every component.
//!
//! Transport errors (sqlx, reqwest, GCS, io) are converted into one of these
//! kinds at the component boundary, so route handlers only ever see a
//! `CoreError`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::models::RequestStatus;

/// One failed transcript strategy, kept so the caller can show what was tried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("transcript unavailable for video {video_id}: {}", join_failures(.failures))]
    TranscriptUnavailable {
        video_id: String,
        failures: Vec<StrategyFailure>,
    },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("quota exceeded: {count} of {limit} credits used")]
    QuotaExceeded { limit: i32, count: i32 },

    #[error("plan expired or inactive")]
    PlanExpired,

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("upload {file_id} incomplete, missing chunks {missing:?}")]
    IncompleteUpload { file_id: String, missing: Vec<u32> },

    #[error("upload {file_id} aborted at chunk {index}: {reason}")]
    ChunkUploadFailed {
        file_id: String,
        index: u32,
        reason: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no transcript strategies configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.strategy, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    /// Stable identifier used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::TranscriptUnavailable { .. } => "transcript_unavailable",
            CoreError::GenerationFailed(_) => "generation_failed",
            CoreError::QuotaExceeded { .. } => "quota_exceeded",
            CoreError::PlanExpired => "plan_expired",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::IncompleteUpload { .. } => "incomplete_upload",
            CoreError::ChunkUploadFailed { .. } => "chunk_upload_failed",
            CoreError::NotFound(_) => "not_found",
            CoreError::Unauthorized(_) => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::BadRequest(_) => "bad_request",
            CoreError::Unavailable(_) => "unavailable",
            CoreError::Storage(_) => "storage",
            CoreError::Database(_) => "database",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::TranscriptUnavailable { .. } | CoreError::GenerationFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            CoreError::QuotaExceeded { .. } | CoreError::PlanExpired => {
                StatusCode::PAYMENT_REQUIRED
            }
            CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CoreError::IncompleteUpload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::ChunkUploadFailed { .. } => StatusCode::BAD_GATEWAY,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Storage(_) | CoreError::Database(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the end user. Internal failures never leak details.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::TranscriptUnavailable { failures, .. } => format!(
                "We couldn't fetch a transcript for this video. The video may have no captions, \
                 the creator may have disabled them, or the transcript service may be down. \
                 Try again later. Details: {}",
                join_failures(failures)
            ),
            CoreError::GenerationFailed(reason) => format!(
                "Content generation failed ({reason}). No credit was used; please try again."
            ),
            CoreError::QuotaExceeded { limit, .. } => format!(
                "You've used all {limit} credits on your plan. Upgrade your plan to keep creating."
            ),
            CoreError::PlanExpired => {
                "Your plan has expired or is inactive. Choose a plan to continue.".to_string()
            }
            CoreError::InvalidTransition { from, to } => format!(
                "This request is {from} and cannot move to {to}. Refresh to see its latest state."
            ),
            CoreError::IncompleteUpload { missing, .. } => format!(
                "The upload is incomplete ({} chunk(s) missing). Restart the file upload.",
                missing.len()
            ),
            CoreError::ChunkUploadFailed { index, .. } => format!(
                "Uploading part {index} of the file failed after several retries. Restart the file upload."
            ),
            CoreError::NotFound(what) => format!("{what} was not found."),
            CoreError::Unauthorized(_) => "Please sign in again.".to_string(),
            CoreError::Forbidden(_) => "You don't have access to this resource.".to_string(),
            CoreError::BadRequest(reason) => reason.clone(),
            CoreError::Unavailable(what) => format!("{what} is temporarily unavailable."),
            CoreError::Storage(_) | CoreError::Database(_) | CoreError::Internal(_) => {
                "Something went wrong on our side. Your data was not saved; please retry."
                    .to_string()
            }
        }
    }

    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Storage(_)
                | CoreError::Database(_)
                | CoreError::Internal(_)
                | CoreError::Unavailable(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::info!(kind = self.kind(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_error_lists_every_strategy() {
        let err = CoreError::TranscriptUnavailable {
            video_id: "abc".into(),
            failures: vec![
                StrategyFailure {
                    strategy: "primary-extractor".into(),
                    message: "timed out after 240s".into(),
                },
                StrategyFailure {
                    strategy: "secondary-extractor".into(),
                    message: "HTTP 503".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("[primary-extractor] timed out after 240s"));
        assert!(text.contains("[secondary-extractor] HTTP 503"));
        assert!(err.user_message().contains("no captions"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn business_rejections_are_not_transient() {
        assert!(!CoreError::PlanExpired.is_transient());
        assert!(!CoreError::QuotaExceeded { limit: 3, count: 3 }.is_transient());
        assert!(CoreError::Storage("disk full".into()).is_transient());
        assert_eq!(
            CoreError::QuotaExceeded { limit: 3, count: 3 }.status(),
            StatusCode::PAYMENT_REQUIRED
        );
    }
}
