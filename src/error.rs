use std::fmt;
use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures creating or removing a job workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace {}: {source}", path.display())]
    Allocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single download attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote returned HTTP {0}")]
    HttpStatus(u16),

    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Why a webhook notification could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// Which of a job's two inputs a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Audio,
    Transcript,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Audio => write!(f, "audio"),
            InputKind::Transcript => write!(f, "transcript"),
        }
    }
}

/// Everything the HTTP endpoint can answer with besides a success body.
///
/// Every variant renders as `{"message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body or parameters were malformed. No job was created.
    #[error("{0}")]
    BadRequest(String),

    /// One of the inputs could not be downloaded.
    #[error("Can't download {kind} from {url}")]
    Fetch { kind: InputKind, url: String },

    /// The job workspace could not be created.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A synchronous job failed after its inputs were staged.
    #[error("Alignment failed for {id}: {reason}")]
    Alignment { id: String, reason: String },

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Fetch { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Workspace(err) => {
                tracing::error!(error = %err, "Workspace allocation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Can't allocate workspace".to_string(),
                )
            }
            ApiError::Alignment { .. } => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
