//! Alignment capability backed by external programs.
//!
//! Resampling shells out to `ffmpeg`; alignment runs a configurable aligner
//! command that prints the alignment JSON on stdout and its progress log on
//! stderr.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use tokio_util::sync::CancellationToken;

use super::client::ForcedAligner;
use super::error::AlignmentError;
use super::types::{AlignOptions, Alignment, Resources};
use crate::config::AlignerConfig;

/// Sample rate the acoustic model was trained on.
const TARGET_SAMPLE_RATE: &str = "8000";

pub struct CommandAligner {
    ffmpeg: String,
    program: String,
    args: Vec<String>,
    nthreads: usize,
}

impl CommandAligner {
    pub fn new(ffmpeg: String, program: String, args: Vec<String>, nthreads: usize) -> Self {
        Self {
            ffmpeg,
            program,
            args,
            nthreads: nthreads.max(1),
        }
    }

    pub fn from_config(config: &AlignerConfig, nthreads: usize) -> Self {
        Self::new(
            config.ffmpeg.clone(),
            config.program.clone(),
            config.args.clone(),
            nthreads,
        )
    }

    fn align_command(
        &self,
        resources: &Resources,
        transcript: &Path,
        audio: &Path,
        options: &AlignOptions,
    ) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(audio)
            .arg(transcript)
            .arg("--nthreads")
            .arg(self.nthreads.to_string());
        if options.disfluency {
            cmd.arg("--disfluency");
        }
        if options.conservative {
            cmd.arg("--conservative");
        }
        cmd.current_dir(&resources.root);
        cmd
    }
}

impl ForcedAligner for CommandAligner {
    fn resample(&self, input: &Path, output: &Path) -> i32 {
        let status = Command::new(&self.ffmpeg)
            .args(["-loglevel", "panic", "-y", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar", TARGET_SAMPLE_RATE, "-acodec", "pcm_s16le"])
            .arg(output)
            .stdin(Stdio::null())
            .status();

        match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                tracing::warn!(program = %self.ffmpeg, error = %e, "Could not start resampler");
                -1
            }
        }
    }

    fn align(
        &self,
        resources: &Resources,
        transcript: &Path,
        audio: &Path,
        options: &AlignOptions,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(&str, &str),
    ) -> Result<Alignment, AlignmentError> {
        let mut child = self
            .align_command(resources, transcript, audio, options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(mut stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AlignmentError::Aligner("aligner pipes unavailable".into()));
        };

        // stdout is drained on its own thread so a large document can't
        // block the child while we are reading stderr.
        let reader = std::thread::spawn(move || {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).map(|_| buf)
        });

        // Progress lines may carry any bytes; they are decoded lossily and
        // stderr is drained to EOF so the child never blocks on a full pipe.
        let mut stderr = BufReader::new(stderr);
        let mut cancelled = false;
        for line in stderr.by_ref().split(b'\n') {
            let Ok(line) = line else { break };
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if !line.is_empty() {
                on_progress("aligner", line);
            }
        }
        if !cancelled {
            let _ = std::io::copy(&mut stderr, &mut std::io::sink());
        }

        if cancelled {
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            return Err(AlignmentError::Cancelled);
        }

        let status = child.wait()?;
        let output = reader
            .join()
            .map_err(|_| AlignmentError::Aligner("stdout reader panicked".into()))??;

        if !status.success() {
            return Err(AlignmentError::Aligner(format!(
                "{} exited with {status}",
                self.program
            )));
        }

        Ok(serde_json::from_str(&output)?)
    }
}
