//! HTTP entry point: `POST /transcriptions`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::aligner::AlignOptions;
use crate::error::ApiError;
use crate::orchestrator::{JobOrchestrator, JobRequest, JobResponse};
use crate::state_machine::Mode;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transcriptions", post(create_transcription))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptionRequest {
    audio_url: Option<String>,
    transcript_url: Option<String>,
    // `null` is a valid payload; only a missing key is rejected.
    #[serde(default, deserialize_with = "present")]
    metadata: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("Missing or empty field: {field}"))),
    }
}

/// Mode and alignment flags from the query string. Flags count by presence.
fn job_flags(params: &HashMap<String, String>) -> (Mode, AlignOptions) {
    let mode = Mode::from_async_param(params.get("async").map(String::as_str));
    let options = AlignOptions::new(
        params.contains_key("disfluency"),
        params.contains_key("conservative"),
    );
    (mode, options)
}

async fn create_transcription(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TranscriptionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?;

    let audio_url = required(request.audio_url, "audioUrl")?;
    let transcript_url = required(request.transcript_url, "transcriptUrl")?;
    let metadata = request
        .metadata
        .ok_or_else(|| ApiError::BadRequest("Missing field: metadata".into()))?;
    let (mode, options) = job_flags(&params);

    tracing::info!(
        %mode,
        audio_url = %audio_url,
        transcript_url = %transcript_url,
        "Received transcription request"
    );

    let ticket = state
        .orchestrator
        .submit(JobRequest {
            audio_url,
            transcript_url,
            metadata,
            mode,
            options,
        })
        .await?;

    match ticket.wait().await? {
        JobResponse::InProgress { id } => Ok(Json(json!({
            "transcription_id": id,
            "status": "IN_PROGRESS",
        }))
        .into_response()),
        JobResponse::Completed(body) => {
            Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
        }
    }
}
