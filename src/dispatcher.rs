//! Outcome delivery for finished jobs.
//!
//! The order is fixed: answer a waiting sync caller, remove the workspace,
//! then notify the webhook. A failure in one step never skips the next.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;

use crate::aligner::Alignment;
use crate::error::DeliveryError;
use crate::state_machine::{AuditRecord, Event, Job, JobOutcome, StateMachine, Transition};
use crate::workspace::WorkspaceManager;

/// What a sync-mode caller receives over its held connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReply {
    /// Pretty-printed alignment JSON.
    Completed(String),
    Failed(String),
}

/// Body POSTed to the configured webhook.
///
/// On success `result` is the pretty-printed alignment as a JSON string,
/// byte for byte what a sync caller receives. On failure it is `-1`.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub transcription_id: &'a str,
    pub metadata: &'a serde_json::Value,
    pub result: serde_json::Value,
    pub status: &'static str,
}

impl<'a> WebhookPayload<'a> {
    /// Build the notification for `outcome`. Cancelled jobs get none.
    pub fn for_outcome(job: &'a Job, outcome: &JobOutcome) -> Option<Self> {
        let (kind, result) = match outcome {
            JobOutcome::Succeeded(alignment) => match render(alignment) {
                Ok(text) => ("realign_success", serde_json::Value::String(text)),
                Err(_) => ("realign_fail", json!(-1)),
            },
            JobOutcome::Failed(_) => ("realign_fail", json!(-1)),
            JobOutcome::Cancelled => return None,
        };

        Some(Self {
            kind,
            transcription_id: &job.id,
            metadata: &job.metadata,
            result,
            status: "DONE",
        })
    }
}

/// Fire-and-forget POST client for the outcome webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Single attempt; the caller decides what to do with a failure.
    pub async fn notify(&self, payload: &WebhookPayload<'_>) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

pub struct ResultDispatcher {
    workspaces: Arc<WorkspaceManager>,
    webhook: Option<WebhookNotifier>,
}

impl ResultDispatcher {
    pub fn new(workspaces: Arc<WorkspaceManager>, webhook: Option<WebhookNotifier>) -> Self {
        Self { workspaces, webhook }
    }

    /// Deliver the outcome of a job that reached a terminal state.
    pub async fn dispatch(
        &self,
        mut job: Job,
        outcome: JobOutcome,
        reply: Option<oneshot::Sender<SyncReply>>,
    ) {
        if let Some(reply) = reply {
            if let Some(message) = sync_reply(&outcome) {
                tracing::info!(job_id = %job.id, "Sending result to caller");
                if reply.send(message).is_err() {
                    tracing::info!(job_id = %job.id, "Caller went away before the result was sent");
                }
            }
        }

        match &outcome {
            JobOutcome::Succeeded(_) => {}
            JobOutcome::Failed(failure) => {
                tracing::warn!(job_id = %job.id, reason = %failure, "Failed during alignment");
            }
            JobOutcome::Cancelled => {
                tracing::info!(job_id = %job.id, "Cancelled alignment");
            }
        }

        self.cleanup(&mut job).await;

        let (Some(webhook), Some(payload)) =
            (&self.webhook, WebhookPayload::for_outcome(&job, &outcome))
        else {
            return;
        };

        tracing::info!(job_id = %job.id, url = webhook.url(), "Sending result to webhook");
        match webhook.notify(&payload).await {
            Ok(()) => tracing::info!(job_id = %job.id, "Webhook sent"),
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Sending webhook failed"),
        }
    }

    /// Remove the job's workspace. Runs at most once per job: the
    /// CLEANED_UP transition is only accepted from a terminal state.
    pub async fn cleanup(&self, job: &mut Job) {
        match StateMachine::next(job, Event::CleanUp) {
            Transition::Next(_) => {
                self.workspaces.destroy(&job.workspace.dir).await;
                let record = AuditRecord::from_job(job);
                tracing::info!(
                    job_id = %record.job_id,
                    duration_ms = record.duration_ms,
                    record = %serde_json::to_string(&record).unwrap_or_default(),
                    "Job finished"
                );
            }
            Transition::Rejected { state, .. } => {
                tracing::warn!(job_id = %job.id, %state, "Cleanup skipped");
            }
        }
    }
}

/// The alignment as both the sync caller and the webhook receive it.
fn render(alignment: &Alignment) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(alignment)
}

fn sync_reply(outcome: &JobOutcome) -> Option<SyncReply> {
    match outcome {
        JobOutcome::Succeeded(alignment) => Some(match render(alignment) {
            Ok(body) => SyncReply::Completed(body),
            Err(e) => SyncReply::Failed(format!("failed to serialize result: {e}")),
        }),
        JobOutcome::Failed(failure) => Some(SyncReply::Failed(failure.to_string())),
        JobOutcome::Cancelled => None,
    }
}
