//! In-memory job registry.
//!
//! [`JobStore`] is the only state shared between request handlers and
//! pipeline workers. Every operation takes the inner lock for a short,
//! non-awaiting critical section; callers never see the lock.

use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::job::{JobRecord, JobSummary, Transition};
use crate::types::{JobId, Timestamp};

/// Concurrency-safe mapping from job id to [`JobRecord`], kept in
/// submission order.
///
/// Created once at startup and shared via `Arc<JobStore>`.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<IndexMap<JobId, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `pending` job for `prompt` and return a snapshot of it.
    pub async fn create(&self, prompt: impl Into<String>) -> JobRecord {
        let record = JobRecord::new(prompt);
        self.jobs.write().await.insert(record.id(), record.clone());
        record
    }

    /// Snapshot read of a single job.
    pub async fn get(&self, id: JobId) -> Result<JobRecord, CoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Apply a state transition atomically and return the updated snapshot.
    ///
    /// Fails with `NotFound` if the job was deleted, or `Conflict` if the
    /// transition is not legal from the job's current state.
    pub async fn update(&self, id: JobId, transition: Transition) -> Result<JobRecord, CoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or_else(|| CoreError::job_not_found(id))?;
        record.apply(transition)?;
        Ok(record.clone())
    }

    /// Atomically claim a completed job's artifact for download.
    ///
    /// Exactly one caller can succeed per job; later callers receive
    /// `AlreadyServed` (or `NotFound` once the job has been removed).
    pub async fn mark_served(&self, id: JobId) -> Result<JobRecord, CoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs.get_mut(&id).ok_or_else(|| CoreError::job_not_found(id))?;
        record.mark_served()?;
        Ok(record.clone())
    }

    /// Remove a job. Idempotent: returns the removed record, if any.
    pub async fn delete(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.write().await.shift_remove(&id)
    }

    /// Snapshot of all jobs, oldest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        self.jobs
            .read()
            .await
            .values()
            .map(JobRecord::summary)
            .collect()
    }

    /// Remove terminal jobs last updated before `cutoff`.
    ///
    /// Jobs whose artifact is currently being streamed are skipped; the
    /// download path removes those itself.
    pub async fn evict_expired(&self, cutoff: Timestamp) -> Vec<JobRecord> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.state().is_terminal() && !job.is_served())
            .filter(|job| job.updated_at() < cutoff)
            .map(JobRecord::id)
            .collect();

        expired.iter().filter_map(|id| jobs.shift_remove(id)).collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::job::{JobFailure, JobState};

    async fn completed_job(store: &JobStore) -> JobId {
        let id = store.create("draw a red circle").await.id();
        store.update(id, Transition::StartGeneration).await.unwrap();
        store
            .update(id, Transition::StartRendering { source: "src".into() })
            .await
            .unwrap();
        store
            .update(
                id,
                Transition::Complete {
                    artifact_path: PathBuf::from("a.mp4"),
                },
            )
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn create_then_get_returns_pending() {
        let store = JobStore::new();
        let created = store.create("hello").await;

        let fetched = store.get(created.id()).await.unwrap();
        assert_eq!(fetched.state(), JobState::Pending);
        assert_eq!(fetched.prompt(), "hello");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = JobStore::new();
        let id = crate::types::new_job_id();
        assert_matches!(store.get(id).await, Err(CoreError::NotFound { .. }));
        assert_matches!(
            store.update(id, Transition::StartGeneration).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn update_after_delete_is_not_found() {
        let store = JobStore::new();
        let id = store.create("x").await.id();
        assert!(store.delete(id).await.is_some());

        assert_matches!(
            store.update(id, Transition::StartGeneration).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = JobStore::new();
        let id = store.create("x").await.id();
        assert!(store.delete(id).await.is_some());
        assert!(store.delete(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_ordered_and_reflects_deletes() {
        let store = JobStore::new();
        let a = store.create("a").await.id();
        let b = store.create("b").await.id();
        let c = store.create("c").await.id();

        let ids: Vec<JobId> = store.list().await.iter().map(|s| s.job_id).collect();
        assert_eq!(ids, vec![a, b, c]);

        store.delete(b).await;
        let ids: Vec<JobId> = store.list().await.iter().map(|s| s.job_id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[tokio::test]
    async fn concurrent_mark_served_has_one_winner() {
        let store = Arc::new(JobStore::new());
        let id = completed_job(&store).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.mark_served(id).await }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert_matches!(e, CoreError::AlreadyServed(_)),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn evict_expired_removes_only_old_terminal_jobs() {
        let store = JobStore::new();
        let done = completed_job(&store).await;
        let failed = store.create("bad").await.id();
        store
            .update(failed, Transition::Fail(JobFailure::Generation("no".into())))
            .await
            .unwrap();
        let pending = store.create("waiting").await.id();
        let served = completed_job(&store).await;
        store.mark_served(served).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let evicted: Vec<JobId> = store
            .evict_expired(cutoff)
            .await
            .iter()
            .map(JobRecord::id)
            .collect();

        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&done));
        assert!(evicted.contains(&failed));
        assert!(store.get(pending).await.is_ok());
        assert!(store.get(served).await.is_ok());
    }

    #[tokio::test]
    async fn evict_expired_keeps_recent_jobs() {
        let store = JobStore::new();
        let done = completed_job(&store).await;

        let cutoff = Utc::now() - chrono::Duration::hours(1);
        assert!(store.evict_expired(cutoff).await.is_empty());
        assert!(store.get(done).await.is_ok());
    }
}
