//! Periodic eviction of finished jobs nobody downloaded.
//!
//! Completed-but-never-downloaded and failed jobs are removed once their
//! last update is older than the retention period, together with any
//! artifact file they still hold.

use std::sync::Arc;
use std::time::Duration;

use animgen_core::artifact::ArtifactManager;
use animgen_core::store::JobStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Run the retention loop until `cancel` is triggered.
pub async fn run(
    store: Arc<JobStore>,
    artifacts: ArtifactManager,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Job retention sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                let evicted = sweep_once(&store, &artifacts, retention).await;
                if evicted > 0 {
                    tracing::info!(evicted, "Job retention: evicted expired jobs");
                } else {
                    tracing::debug!("Job retention: nothing to evict");
                }
            }
        }
    }
}

/// Evict terminal jobs idle for longer than `retention`. Returns the number
/// of jobs removed.
pub async fn sweep_once(store: &JobStore, artifacts: &ArtifactManager, retention: Duration) -> usize {
    let Some(cutoff) = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
        return 0;
    };

    let evicted = store.evict_expired(cutoff).await;
    for record in &evicted {
        tracing::debug!(job_id = %record.id(), state = %record.state(), "Evicting expired job");
        artifacts.reclaim(record).await;
    }
    evicted.len()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use animgen_core::job::{JobFailure, JobState, Transition};

    use super::*;

    async fn completed_job(store: &JobStore, artifact: PathBuf) -> animgen_core::types::JobId {
        let id = store.create("draw a red circle").await.id();
        store.update(id, Transition::StartGeneration).await.unwrap();
        store
            .update(id, Transition::StartRendering { source: "src".into() })
            .await
            .unwrap();
        store
            .update(id, Transition::Complete { artifact_path: artifact })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn expired_terminal_jobs_and_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("animation_a.mp4");
        std::fs::write(&artifact, b"video").unwrap();

        let store = Arc::new(JobStore::new());
        let artifacts = ArtifactManager::new(Arc::clone(&store));

        let done = completed_job(&store, artifact.clone()).await;
        let failed = store.create("broken").await.id();
        store
            .update(failed, Transition::Fail(JobFailure::Generation("nope".into())))
            .await
            .unwrap();
        let pending = store.create("waiting").await.id();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = sweep_once(&store, &artifacts, Duration::from_millis(5)).await;

        assert_eq!(evicted, 2);
        assert!(store.get(done).await.is_err());
        assert!(store.get(failed).await.is_err());
        assert_eq!(store.get(pending).await.unwrap().state(), JobState::Pending);
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn recent_jobs_survive() {
        let store = Arc::new(JobStore::new());
        let artifacts = ArtifactManager::new(Arc::clone(&store));
        let id = store.create("fresh").await.id();
        store
            .update(id, Transition::Fail(JobFailure::Internal("boom".into())))
            .await
            .unwrap();

        assert_eq!(sweep_once(&store, &artifacts, Duration::from_secs(3600)).await, 0);
        assert!(store.get(id).await.is_ok());
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let store = Arc::new(JobStore::new());
        let artifacts = ArtifactManager::new(Arc::clone(&store));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(
            store,
            artifacts,
            Duration::from_secs(60),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
