use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::State;
use crate::aligner::{AlignOptions, Alignment};
use crate::workspace::Workspace;

/// Whether the caller's connection is held until the outcome is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sync,
    Async,
}

impl Mode {
    /// Async unless the `async` parameter is literally `"false"`.
    pub fn from_async_param(value: Option<&str>) -> Self {
        match value {
            Some("false") => Mode::Sync,
            _ => Mode::Async,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sync => write!(f, "sync"),
            Mode::Async => write!(f, "async"),
        }
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Failure {
    AudioFetch,
    TranscriptFetch,
    Alignment(String),
    /// The server shut down before the inputs were staged.
    Interrupted,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::AudioFetch => write!(f, "audio fetch failed"),
            Failure::TranscriptFetch => write!(f, "transcript fetch failed"),
            Failure::Alignment(msg) => write!(f, "{msg}"),
            Failure::Interrupted => write!(f, "interrupted by shutdown"),
        }
    }
}

/// How the alignment phase of a job concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(Alignment),
    Failed(Failure),
    Cancelled,
}

/// One request's unit of work, from admission to cleanup.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub workspace: Workspace,
    pub mode: Mode,
    pub options: AlignOptions,
    /// Caller payload echoed in webhooks; never inspected.
    pub metadata: serde_json::Value,
    pub state: State,
    pub state_history: Vec<State>,
    pub failure: Option<Failure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        workspace: Workspace,
        mode: Mode,
        options: AlignOptions,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: workspace.id.clone(),
            workspace,
            mode,
            options,
            metadata,
            state: State::Created,
            state_history: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Summary of a finished job, logged once its workspace is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: String,
    pub mode: Mode,
    pub state_transitions: Vec<State>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl AuditRecord {
    pub fn from_job(job: &Job) -> Self {
        let now = Utc::now();
        let mut transitions = job.state_history.clone();
        transitions.push(job.state);

        Self {
            job_id: job.id.clone(),
            mode: job.mode,
            state_transitions: transitions,
            failure: job.failure.as_ref().map(ToString::to_string),
            started_at: job.created_at,
            completed_at: now,
            duration_ms: (now - job.created_at).num_milliseconds(),
        }
    }
}
