//! Per-job working directories.
//!
//! Every job gets `<data_dir>/transcriptions/<id>`, where `id` is eight hex
//! characters. The directory holds the downloaded inputs and the resampled
//! audio and is removed once the job's outcome has been delivered.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::WorkspaceError;

pub const AUDIO_FILENAME: &str = "audio.wav";
pub const TRANSCRIPT_FILENAME: &str = "transcript.txt";
pub const RESAMPLED_FILENAME: &str = "audio-resampled.wav";

const ID_LEN: usize = 8;

/// A job's exclusively owned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub dir: PathBuf,
}

impl Workspace {
    pub fn new(id: String, dir: PathBuf) -> Self {
        Self { id, dir }
    }

    pub fn audio_path(&self) -> PathBuf {
        self.dir.join(AUDIO_FILENAME)
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir.join(TRANSCRIPT_FILENAME)
    }

    pub fn resampled_path(&self) -> PathBuf {
        self.dir.join(RESAMPLED_FILENAME)
    }
}

/// Allocates and destroys job workspaces under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().join("transcriptions"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a job with `id` lives in.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Create a fresh workspace with an id no existing directory uses.
    ///
    /// The final directory is created with `create_dir`, so a concurrent
    /// allocation that picked the same id loses the race and retries.
    pub async fn allocate(&self) -> Result<Workspace, WorkspaceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WorkspaceError::Allocation {
                path: self.root.clone(),
                source,
            })?;

        loop {
            let id = new_id();
            let dir = self.path_for(&id);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    tracing::debug!(job_id = %id, path = %dir.display(), "Workspace allocated");
                    return Ok(Workspace::new(id, dir));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(WorkspaceError::Allocation { path: dir, source }),
            }
        }
    }

    /// Recursively remove `dir`. A directory that is already gone counts as
    /// removed.
    pub async fn try_destroy(&self, dir: &Path) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkspaceError::Cleanup {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    /// Best-effort removal: failures are logged and swallowed.
    pub async fn destroy(&self, dir: &Path) {
        tracing::info!(path = %dir.display(), "Cleaning up");
        if let Err(e) = self.try_destroy(dir).await {
            tracing::warn!(error = %e, "Failed to clean up");
        }
    }
}

fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn ids_are_eight_hex_chars() {
        let id = new_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn workspace_file_layout() {
        let ws = Workspace::new("abcd1234".into(), PathBuf::from("/data/transcriptions/abcd1234"));
        assert_eq!(ws.audio_path(), PathBuf::from("/data/transcriptions/abcd1234/audio.wav"));
        assert_eq!(
            ws.transcript_path(),
            PathBuf::from("/data/transcriptions/abcd1234/transcript.txt")
        );
        assert_eq!(
            ws.resampled_path(),
            PathBuf::from("/data/transcriptions/abcd1234/audio-resampled.wav")
        );
    }

    #[tokio::test]
    async fn allocate_creates_directory_under_root() {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let ws = manager.allocate().await.unwrap();

        assert!(ws.dir.is_dir());
        assert_eq!(ws.dir, tmp.path().join("transcriptions").join(&ws.id));
        assert_eq!(manager.path_for(&ws.id), ws.dir);
    }

    #[tokio::test]
    async fn allocate_never_reuses_a_live_id() {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let mut ids = HashSet::new();
        for _ in 0..50 {
            let ws = manager.allocate().await.unwrap();
            assert!(ids.insert(ws.id));
        }
        assert_eq!(std::fs::read_dir(manager.root()).unwrap().count(), 50);
    }

    #[tokio::test]
    async fn allocate_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("transcriptions"), b"not a dir").unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let err = manager.allocate().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Allocation { .. }));
    }

    #[tokio::test]
    async fn destroy_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(tmp.path());
        let ws = manager.allocate().await.unwrap();
        std::fs::write(ws.audio_path(), b"RIFF").unwrap();

        manager.destroy(&ws.dir).await;

        assert!(!ws.dir.exists());
    }

    #[tokio::test]
    async fn destroy_of_missing_directory_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        assert!(manager.try_destroy(&tmp.path().join("gone")).await.is_ok());
        manager.destroy(&tmp.path().join("gone")).await;
    }
}
