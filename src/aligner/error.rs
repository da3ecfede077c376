use thiserror::Error;

/// Errors raised while running the alignment stage of a job.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// The resampling step reported a nonzero status.
    #[error("resample failed with status {status}")]
    Resample { status: i32 },

    /// The aligner process could not be started or waited on.
    #[error("failed to run aligner: {0}")]
    Spawn(#[from] std::io::Error),

    /// The aligner ran but reported failure.
    #[error("aligner failed: {0}")]
    Aligner(String),

    /// The aligner output was not a valid alignment document.
    #[error("invalid aligner output: {0}")]
    Output(#[from] serde_json::Error),

    /// The job was cancelled before the alignment finished.
    #[error("alignment cancelled")]
    Cancelled,

    /// The pool task running the alignment died or was shut down.
    #[error("alignment worker failed: {0}")]
    Worker(String),
}
