use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::error::AlignmentError;
use super::types::{AlignOptions, Alignment, Resources};
use crate::workspace::Workspace;

/// The external forced-alignment capability.
///
/// Both calls are blocking and may run for minutes; callers must keep them
/// off the async runtime threads.
pub trait ForcedAligner: Send + Sync {
    /// Convert `input` to the sample rate and format the aligner expects.
    /// Returns the process-style status code, 0 meaning success.
    fn resample(&self, input: &Path, output: &Path) -> i32;

    /// Align `transcript` against the already resampled `audio`.
    ///
    /// `on_progress(stage, detail)` may be called any number of times.
    /// Implementations should check `cancel` at points where stopping
    /// leaves no shared state behind.
    fn align(
        &self,
        resources: &Resources,
        transcript: &Path,
        audio: &Path,
        options: &AlignOptions,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(&str, &str),
    ) -> Result<Alignment, AlignmentError>;
}

/// Runs resample + align for one job workspace as a single blocking call.
pub struct AlignmentClient {
    aligner: Arc<dyn ForcedAligner>,
    resources: Resources,
}

impl AlignmentClient {
    pub fn new(aligner: Arc<dyn ForcedAligner>, resources: Resources) -> Self {
        Self { aligner, resources }
    }

    /// Resample the staged audio, then align it with the staged transcript.
    ///
    /// Fails fast with [`AlignmentError::Resample`] when resampling reports a
    /// nonzero status; the aligner is not invoked in that case.
    pub fn align(
        &self,
        workspace: &Workspace,
        options: &AlignOptions,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(&str, &str),
    ) -> Result<Alignment, AlignmentError> {
        if cancel.is_cancelled() {
            return Err(AlignmentError::Cancelled);
        }

        let audio = workspace.audio_path();
        let resampled = workspace.resampled_path();

        tracing::info!(path = %audio.display(), "Resampling audio file");
        let status = self.aligner.resample(&audio, &resampled);
        if status != 0 {
            tracing::warn!(path = %audio.display(), status, "Failed to resample");
            return Err(AlignmentError::Resample { status });
        }

        if cancel.is_cancelled() {
            return Err(AlignmentError::Cancelled);
        }

        tracing::info!(job_id = %workspace.id, "Starting alignment");
        let alignment = self.aligner.align(
            &self.resources,
            &workspace.transcript_path(),
            &resampled,
            options,
            cancel,
            on_progress,
        )?;
        tracing::info!(
            job_id = %workspace.id,
            words = alignment.words.len(),
            "Finished alignment"
        );

        Ok(alignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::fake::FakeAligner;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn staged_workspace(tmp: &TempDir) -> Workspace {
        let workspace = Workspace::new("abcd1234".into(), tmp.path().to_path_buf());
        std::fs::write(workspace.audio_path(), b"RIFF").unwrap();
        std::fs::write(workspace.transcript_path(), "the quick brown fox").unwrap();
        workspace
    }

    #[test]
    fn align_runs_resample_then_aligner() {
        let tmp = TempDir::new().unwrap();
        let workspace = staged_workspace(&tmp);
        let fake = Arc::new(FakeAligner::ok());
        let client = AlignmentClient::new(fake.clone(), Resources::new("."));

        let mut stages = Vec::new();
        let alignment = client
            .align(
                &workspace,
                &AlignOptions::default(),
                &CancellationToken::new(),
                &mut |stage, _| stages.push(stage.to_string()),
            )
            .unwrap();

        assert_eq!(alignment.transcript, "the quick brown fox");
        assert_eq!(fake.resample_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.align_calls.load(Ordering::SeqCst), 1);
        assert!(!stages.is_empty());
    }

    #[test]
    fn resample_failure_skips_aligner() {
        let tmp = TempDir::new().unwrap();
        let workspace = staged_workspace(&tmp);
        let fake = Arc::new(FakeAligner::failing_resample(1));
        let client = AlignmentClient::new(fake.clone(), Resources::new("."));

        let err = client
            .align(
                &workspace,
                &AlignOptions::default(),
                &CancellationToken::new(),
                &mut |_, _| {},
            )
            .unwrap_err();

        assert!(matches!(err, AlignmentError::Resample { status: 1 }));
        assert_eq!(fake.align_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_token_stops_before_resample() {
        let tmp = TempDir::new().unwrap();
        let workspace = staged_workspace(&tmp);
        let fake = Arc::new(FakeAligner::ok());
        let client = AlignmentClient::new(fake.clone(), Resources::new("."));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .align(&workspace, &AlignOptions::default(), &cancel, &mut |_, _| {})
            .unwrap_err();

        assert!(matches!(err, AlignmentError::Cancelled));
        assert_eq!(fake.resample_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn aligner_error_propagates() {
        let tmp = TempDir::new().unwrap();
        let workspace = staged_workspace(&tmp);
        let client = AlignmentClient::new(
            Arc::new(FakeAligner::failing("model missing")),
            Resources::new("."),
        );

        let err = client
            .align(
                &workspace,
                &AlignOptions::default(),
                &CancellationToken::new(),
                &mut |_, _| {},
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "aligner failed: model missing");
    }
}
