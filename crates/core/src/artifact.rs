//! Artifact lifecycle: serve a rendered file exactly once, then reclaim it.
//!
//! [`ArtifactManager::fetch_for_download`] claims the job atomically and
//! returns an [`ArtifactLease`] holding an open file handle. The lease is
//! meant to live inside the response body stream; when it is dropped,
//! whether the stream finished or the client went away, the artifact file
//! and the job record are removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;

use crate::error::CoreError;
use crate::job::JobRecord;
use crate::store::JobStore;
use crate::types::JobId;

/// Governs when artifacts may be served and when they are deleted.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    store: Arc<JobStore>,
}

impl ArtifactManager {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Claim a completed job's artifact for a single download.
    ///
    /// Fails with `NotFound` (unknown job), `NotReady` (not completed, or
    /// failed) or `AlreadyServed` (another download already claimed it).
    pub async fn fetch_for_download(&self, id: JobId) -> Result<ArtifactLease, CoreError> {
        let record = self.store.mark_served(id).await?;
        let path = record
            .artifact_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| CoreError::Internal(format!("completed job {id} has no artifact")))?;

        let opened = async {
            let file = File::open(&path).await?;
            let size = file.metadata().await?.len();
            Ok::<_, std::io::Error>((file, size))
        }
        .await;

        match opened {
            Ok((file, size)) => {
                tracing::info!(job_id = %id, path = %path.display(), size, "Artifact claimed for download");
                Ok(ArtifactLease {
                    job_id: id,
                    path,
                    size,
                    file: Some(file),
                    store: Arc::clone(&self.store),
                })
            }
            Err(e) => {
                // The file is gone; drop the record so the client resubmits
                // instead of polling a job that can never be served.
                tracing::error!(job_id = %id, path = %path.display(), error = %e, "Artifact file unreadable");
                self.store.delete(id).await;
                remove_artifact_file(&path).await;
                Err(CoreError::Internal(format!(
                    "artifact for job {id} is unreadable: {e}"
                )))
            }
        }
    }

    /// Remove a job and its artifact (if any), whatever its state.
    ///
    /// In-flight jobs lose only their record; the pipeline runner's later
    /// updates become no-ops.
    pub async fn delete(&self, id: JobId) -> Result<JobRecord, CoreError> {
        let record = self
            .store
            .delete(id)
            .await
            .ok_or_else(|| CoreError::job_not_found(id))?;
        self.reclaim(&record).await;
        tracing::info!(job_id = %id, state = %record.state(), "Job deleted");
        Ok(record)
    }

    /// Remove the artifact file belonging to an already-removed record.
    pub async fn reclaim(&self, record: &JobRecord) {
        if let Some(path) = record.artifact_path() {
            remove_artifact_file(path).await;
        }
    }
}

/// A claimed artifact, open for streaming.
///
/// Dropping the lease deletes the artifact file and the job record.
#[derive(Debug)]
pub struct ArtifactLease {
    job_id: JobId,
    path: PathBuf,
    size: u64,
    file: Option<File>,
    store: Arc<JobStore>,
}

impl ArtifactLease {
    /// File size in bytes at claim time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File name clients should save the download as.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("animation_{}.mp4", self.job_id))
    }

    /// Take the open file handle for streaming. Returns `None` after the
    /// first call.
    pub fn take_file(&mut self) -> Option<File> {
        self.file.take()
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        // Close our handle before unlinking.
        self.file.take();
        log_removal(&self.path, std::fs::remove_file(&self.path));

        let store = Arc::clone(&self.store);
        let id = self.job_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.delete(id).await;
                    tracing::info!(job_id = %id, "Served job reclaimed");
                });
            }
            Err(_) => {
                tracing::warn!(job_id = %id, "No runtime available; served job record not removed");
            }
        }
    }
}

async fn remove_artifact_file(path: &Path) {
    log_removal(path, tokio::fs::remove_file(path).await);
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Artifact file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove artifact file"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::job::{JobFailure, Transition};

    async fn completed_job(store: &JobStore, dir: &Path) -> (JobId, PathBuf) {
        let id = store.create("draw a red circle").await.id();
        let path = dir.join(format!("animation_{id}.mp4"));
        std::fs::write(&path, b"fake video bytes").unwrap();

        store.update(id, Transition::StartGeneration).await.unwrap();
        store
            .update(id, Transition::StartRendering { source: "src".into() })
            .await
            .unwrap();
        store
            .update(
                id,
                Transition::Complete {
                    artifact_path: path.clone(),
                },
            )
            .await
            .unwrap();
        (id, path)
    }

    /// Wait for the lease's spawned cleanup to run.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn download_streams_then_reclaims() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let (id, path) = completed_job(&store, dir.path()).await;

        let mut lease = manager.fetch_for_download(id).await.unwrap();
        assert_eq!(lease.size(), 16);
        assert_eq!(lease.file_name(), format!("animation_{id}.mp4"));

        let mut body = Vec::new();
        lease
            .take_file()
            .unwrap()
            .read_to_end(&mut body)
            .await
            .unwrap();
        assert_eq!(body, b"fake video bytes");

        // Second claim while the first is still streaming.
        assert_matches!(
            manager.fetch_for_download(id).await,
            Err(CoreError::AlreadyServed(_))
        );

        drop(lease);
        settle().await;

        assert!(!path.exists());
        assert_matches!(store.get(id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(
            manager.fetch_for_download(id).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn pending_job_is_not_ready() {
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let id = store.create("x").await.id();

        assert_matches!(
            manager.fetch_for_download(id).await,
            Err(CoreError::NotReady(_))
        );
        // A refused download does not consume the job.
        assert!(store.get(id).await.is_ok());
    }

    #[tokio::test]
    async fn failed_job_is_not_ready() {
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let id = store.create("x").await.id();
        store
            .update(id, Transition::Fail(JobFailure::Generation("boom".into())))
            .await
            .unwrap();

        assert_matches!(
            manager.fetch_for_download(id).await,
            Err(CoreError::NotReady(_))
        );
    }

    #[tokio::test]
    async fn missing_file_drops_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let (id, path) = completed_job(&store, dir.path()).await;
        std::fs::remove_file(&path).unwrap();

        assert_matches!(
            manager.fetch_for_download(id).await,
            Err(CoreError::Internal(_))
        );
        assert_matches!(store.get(id).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_record_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let (id, path) = completed_job(&store, dir.path()).await;

        let removed = manager.delete(id).await.unwrap();
        assert_eq!(removed.id(), id);
        assert!(!path.exists());
        assert!(store.list().await.is_empty());
        assert_matches!(manager.delete(id).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reclaim_removes_file_of_evicted_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let (id, path) = completed_job(&store, dir.path()).await;

        let record = store.delete(id).await.unwrap();
        manager.reclaim(&record).await;
        assert!(!path.exists());

        // Already gone is not an error.
        manager.reclaim(&record).await;
    }

    #[tokio::test]
    async fn delete_in_flight_job_removes_record_only() {
        let store = Arc::new(JobStore::new());
        let manager = ArtifactManager::new(Arc::clone(&store));
        let id = store.create("x").await.id();
        store.update(id, Transition::StartGeneration).await.unwrap();

        manager.delete(id).await.unwrap();

        assert_matches!(
            store
                .update(id, Transition::StartRendering { source: "s".into() })
                .await,
            Err(CoreError::NotFound { .. })
        );
    }
}
