use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aligner::{AlignOptions, Alignment, AlignmentClient, AlignmentError};
use crate::workspace::Workspace;

/// Bounded set of slots for the blocking alignment call.
///
/// At most `size` alignments run at once; further submissions wait for a
/// slot in arrival order (the semaphore is fair) and are never rejected.
#[derive(Clone)]
pub struct AlignmentPool {
    permits: Arc<Semaphore>,
    client: Arc<AlignmentClient>,
    size: usize,
}

impl AlignmentPool {
    pub fn new(client: Arc<AlignmentClient>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            client,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue an alignment for `workspace`.
    ///
    /// Aborting the returned handle while it waits for a slot removes it from
    /// the queue. Once running, only `cancel` can stop it, and only at the
    /// aligner's safe points.
    pub fn submit(
        &self,
        workspace: Workspace,
        options: AlignOptions,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<Alignment, AlignmentError>> {
        let permits = Arc::clone(&self.permits);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| AlignmentError::Worker("alignment pool closed".into()))?;

            if cancel.is_cancelled() {
                return Err(AlignmentError::Cancelled);
            }

            tokio::task::spawn_blocking(move || {
                // The slot stays taken until the blocking call returns, even
                // if the awaiting task is aborted.
                let _permit = permit;
                client.align(&workspace, &options, &cancel, &mut |stage, detail| {
                    tracing::info!(job_id = %workspace.id, stage, detail, "Alignment progress");
                })
            })
            .await
            .map_err(|e| AlignmentError::Worker(e.to_string()))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::Resources;
    use crate::aligner::fake::FakeAligner;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    fn pool_with(fake: Arc<FakeAligner>, size: usize) -> AlignmentPool {
        let client = AlignmentClient::new(fake, Resources::new("."));
        AlignmentPool::new(Arc::new(client), size)
    }

    fn workspace(tmp: &TempDir, id: &str) -> Workspace {
        let dir = tmp.path().join(id);
        std::fs::create_dir_all(&dir).unwrap();
        Workspace::new(id.to_string(), dir)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_runs_more_than_size_alignments() {
        let tmp = TempDir::new().unwrap();
        let fake = Arc::new(FakeAligner::slow(Duration::from_millis(100)));
        let pool = pool_with(fake.clone(), 2);

        let handles: Vec<_> = (0..5)
            .map(|i| {
                pool.submit(
                    workspace(&tmp, &format!("job{i}")),
                    AlignOptions::default(),
                    CancellationToken::new(),
                )
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(fake.align_calls.load(Ordering::SeqCst), 5);
        assert!(fake.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_while_queued_never_runs() {
        let tmp = TempDir::new().unwrap();
        let fake = Arc::new(FakeAligner::slow(Duration::from_millis(200)));
        let pool = pool_with(fake.clone(), 1);

        let first = pool.submit(
            workspace(&tmp, "first"),
            AlignOptions::default(),
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let cancel = CancellationToken::new();
        let second = pool.submit(workspace(&tmp, "second"), AlignOptions::default(), cancel.clone());
        cancel.cancel();

        assert!(first.await.unwrap().is_ok());
        assert!(matches!(second.await.unwrap(), Err(AlignmentError::Cancelled)));
        assert_eq!(fake.align_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_size_is_clamped_to_one() {
        let pool = pool_with(Arc::new(FakeAligner::ok()), 0);
        assert_eq!(pool.size(), 1);
    }

    #[tokio::test]
    async fn alignment_failure_is_returned() {
        let tmp = TempDir::new().unwrap();
        let pool = pool_with(Arc::new(FakeAligner::failing_resample(2)), 1);

        let result = pool
            .submit(workspace(&tmp, "job"), AlignOptions::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result, Err(AlignmentError::Resample { status: 2 })));
    }
}
