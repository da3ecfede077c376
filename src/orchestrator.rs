use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, DropGuard};
use tokio_util::task::TaskTracker;

use crate::aligner::{AlignOptions, AlignmentError};
use crate::dispatcher::{ResultDispatcher, SyncReply};
use crate::error::{ApiError, InputKind, WorkspaceError};
use crate::fetcher::Fetcher;
use crate::pool::AlignmentPool;
use crate::state_machine::{Event, Failure, Job, JobOutcome, Mode, StateMachine};
use crate::workspace::WorkspaceManager;

/// A validated request, ready to become a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub audio_url: String,
    pub transcript_url: String,
    pub metadata: Value,
    pub mode: Mode,
    pub options: AlignOptions,
}

/// What the caller is told once its job has been admitted.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResponse {
    /// Async mode: alignment was submitted and runs in the background.
    InProgress { id: String },
    /// Sync mode: the pretty-printed alignment.
    Completed(String),
}

/// The caller's handle on a running job.
///
/// In sync mode the ticket holds the job's cancellation guard: dropping it
/// before the result arrives (the connection went away) cancels the job.
pub struct JobTicket {
    pub id: String,
    admitted: oneshot::Receiver<Result<(), ApiError>>,
    reply: Option<oneshot::Receiver<SyncReply>>,
    guard: Option<DropGuard>,
}

impl JobTicket {
    /// Wait until the job is admitted and, in sync mode, until it finishes.
    pub async fn wait(mut self) -> Result<JobResponse, ApiError> {
        (&mut self.admitted)
            .await
            .map_err(|_| ApiError::Internal(format!("job {} stopped before admission", self.id)))??;

        let Some(reply) = self.reply.take() else {
            return Ok(JobResponse::InProgress { id: self.id });
        };

        let reply = reply
            .await
            .map_err(|_| ApiError::Internal(format!("job {} ended without a result", self.id)));
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }

        match reply? {
            SyncReply::Completed(body) => Ok(JobResponse::Completed(body)),
            SyncReply::Failed(reason) => Err(ApiError::Alignment {
                id: self.id,
                reason,
            }),
        }
    }
}

/// Drives jobs from admission through fetching and alignment to dispatch.
pub struct JobOrchestrator {
    workspaces: Arc<WorkspaceManager>,
    fetcher: Fetcher,
    pool: AlignmentPool,
    dispatcher: ResultDispatcher,
    /// Every job pipeline still running.
    jobs: TaskTracker,
    /// Parent of every job's cancellation token.
    shutdown: CancellationToken,
}

impl JobOrchestrator {
    pub fn new(
        workspaces: Arc<WorkspaceManager>,
        fetcher: Fetcher,
        pool: AlignmentPool,
        dispatcher: ResultDispatcher,
    ) -> Self {
        Self {
            workspaces,
            fetcher,
            pool,
            dispatcher,
            jobs: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel every in-flight job and wait until each has been cleaned up.
    ///
    /// Jobs still downloading stop at once and fail; jobs queued or running
    /// in the pool end as cancelled. No webhook fires for either.
    pub async fn shutdown(&self) {
        tracing::info!(jobs = self.jobs.len(), "Cancelling in-flight jobs");
        self.shutdown.cancel();
        self.jobs.close();
        self.jobs.wait().await;
        tracing::info!("All jobs cleaned up");
    }

    /// Allocate a workspace and start the job's pipeline.
    ///
    /// Only allocation can fail here. Everything after it runs in its own
    /// task, so the workspace is cleaned up even if the caller goes away.
    pub async fn submit(self: &Arc<Self>, request: JobRequest) -> Result<JobTicket, WorkspaceError> {
        let workspace = self.workspaces.allocate().await?;
        let JobRequest {
            audio_url,
            transcript_url,
            metadata,
            mode,
            options,
        } = request;

        let job = Job::new(workspace, mode, options, metadata);
        let id = job.id.clone();
        tracing::info!(job_id = %id, %mode, "Job admitted");

        let cancel = self.shutdown.child_token();
        let (admitted_tx, admitted_rx) = oneshot::channel();
        let (reply_tx, reply_rx, guard) = match mode {
            Mode::Sync => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx), Some(cancel.clone().drop_guard()))
            }
            Mode::Async => (None, None, None),
        };

        let this = Arc::clone(self);
        self.jobs.spawn(async move {
            let inputs = Inputs {
                audio_url,
                transcript_url,
            };
            this.run(job, inputs, cancel, admitted_tx, reply_tx).await;
        });

        Ok(JobTicket {
            id,
            admitted: admitted_rx,
            reply: reply_rx,
            guard,
        })
    }

    async fn run(
        &self,
        mut job: Job,
        inputs: Inputs,
        cancel: CancellationToken,
        admitted: oneshot::Sender<Result<(), ApiError>>,
        reply: Option<oneshot::Sender<SyncReply>>,
    ) {
        StateMachine::next(&mut job, Event::Fetch);

        let staged = [
            (InputKind::Audio, inputs.audio_url, job.workspace.audio_path(), Failure::AudioFetch),
            (
                InputKind::Transcript,
                inputs.transcript_url,
                job.workspace.transcript_path(),
                Failure::TranscriptFetch,
            ),
        ];
        // A disconnected sync caller does not stop the downloads; only a
        // server shutdown does.
        for (kind, url, dest, failure) in staged {
            let fetched = tokio::select! {
                fetched = self.fetcher.fetch(&url, &dest) => Some(fetched),
                () = self.shutdown.cancelled() => None,
            };
            let (failure, error) = match fetched {
                Some(true) => continue,
                Some(false) => (failure, ApiError::Fetch { kind, url }),
                None => (
                    Failure::Interrupted,
                    ApiError::Internal("server is shutting down".into()),
                ),
            };

            tracing::warn!(job_id = %job.id, reason = %failure, "Job failed before alignment");
            StateMachine::next(&mut job, Event::Fail(failure));
            self.dispatcher.cleanup(&mut job).await;
            let _ = admitted.send(Err(error));
            return;
        }

        StateMachine::next(&mut job, Event::Align);
        tracing::info!(job_id = %job.id, "Submitting alignment");
        let mut handle = self.pool.submit(
            job.workspace.clone(),
            job.options.clone(),
            cancel.child_token(),
        );
        let _ = admitted.send(Ok(()));

        let outcome = tokio::select! {
            result = &mut handle => match result {
                Ok(Ok(alignment)) => JobOutcome::Succeeded(alignment),
                Ok(Err(AlignmentError::Cancelled)) => JobOutcome::Cancelled,
                Ok(Err(e)) => JobOutcome::Failed(Failure::Alignment(e.to_string())),
                Err(e) => JobOutcome::Failed(Failure::Alignment(format!("alignment task failed: {e}"))),
            },
            () = cancel.cancelled() => {
                tracing::info!(job_id = %job.id, "Cancelling alignment");
                handle.abort();
                JobOutcome::Cancelled
            }
        };

        StateMachine::next(&mut job, Event::from(&outcome));
        self.dispatcher.dispatch(job, outcome, reply).await;
    }
}

struct Inputs {
    audio_url: String,
    transcript_url: String,
}
