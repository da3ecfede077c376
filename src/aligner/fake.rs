//! In-process stand-in for the alignment capability, used by tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::client::ForcedAligner;
use super::error::AlignmentError;
use super::types::{AlignOptions, Alignment, Resources};

pub struct FakeAligner {
    resample_status: i32,
    failure: Option<String>,
    delay: Duration,
    pub resample_calls: AtomicUsize,
    pub align_calls: AtomicUsize,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeAligner {
    pub fn ok() -> Self {
        Self {
            resample_status: 0,
            failure: None,
            delay: Duration::ZERO,
            resample_calls: AtomicUsize::new(0),
            align_calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::ok() }
    }

    pub fn failing_resample(status: i32) -> Self {
        Self {
            resample_status: status,
            ..Self::ok()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::ok()
        }
    }
}

impl ForcedAligner for FakeAligner {
    fn resample(&self, _input: &Path, _output: &Path) -> i32 {
        self.resample_calls.fetch_add(1, Ordering::SeqCst);
        self.resample_status
    }

    fn align(
        &self,
        _resources: &Resources,
        transcript: &Path,
        _audio: &Path,
        _options: &AlignOptions,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(&str, &str),
    ) -> Result<Alignment, AlignmentError> {
        self.align_calls.fetch_add(1, Ordering::SeqCst);
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        on_progress("align", "started");

        let deadline = Instant::now() + self.delay;
        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(AlignmentError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(AlignmentError::Aligner(message.clone()));
        }

        on_progress("align", "done");
        Ok(Alignment {
            transcript: std::fs::read_to_string(transcript).unwrap_or_default(),
            words: Vec::new(),
        })
    }
}
