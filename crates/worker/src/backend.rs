//! Bounded worker pool for pipeline runs.
//!
//! Submissions go onto an unbounded FIFO queue. A single dispatcher task
//! takes a concurrency permit, then the next job id, and spawns the run on
//! a [`TaskTracker`], so jobs start in submission order and a saturated
//! pool queues instead of rejecting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use animgen_core::error::CoreError;
use animgen_core::job::{JobFailure, Transition};
use animgen_core::types::JobId;
use animgen_pipeline::runner::{PipelineRunner, RunOutcome};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Snapshot of backend load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStats {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    running: AtomicUsize,
}

/// Handle to the running worker pool. Cheap to share behind an `Arc`.
pub struct ExecutionBackend {
    tx: mpsc::UnboundedSender<JobId>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    max_concurrent: usize,
}

impl ExecutionBackend {
    /// Start the dispatcher. `max_concurrent` is clamped to at least 1.
    pub fn start(runner: Arc<PipelineRunner>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let dispatcher = Dispatcher {
            runner,
            rx,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: Arc::clone(&counters),
            tracker: tracker.clone(),
        };
        tracker.spawn(dispatcher.run(cancel.clone()));

        tracing::info!(max_concurrent, "Execution backend started");

        Self {
            tx,
            counters,
            cancel,
            tracker,
            max_concurrent,
        }
    }

    /// Queue job `id` for execution. Never blocks.
    pub fn submit(&self, id: JobId) -> Result<(), CoreError> {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(id).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::Internal(
                "execution backend is shut down".to_string(),
            ));
        }
        tracing::debug!(job_id = %id, "Job queued");
        Ok(())
    }

    pub fn stats(&self) -> BackendStats {
        BackendStats {
            queued: self.counters.queued.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
        }
    }

    /// Stop dispatching and wait up to `timeout` for in-flight runs.
    ///
    /// Jobs still queued are left `pending`. Returns `true` if every
    /// in-flight run finished within the timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tracker.close();

        let in_flight = self.counters.running.load(Ordering::SeqCst);
        tracing::info!(in_flight, "Draining execution backend");

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("Execution backend drained");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    running = self.counters.running.load(Ordering::SeqCst),
                    "Shutdown timeout exceeded with runs still in flight"
                );
                false
            }
        }
    }
}

struct Dispatcher {
    runner: Arc<PipelineRunner>,
    rx: mpsc::UnboundedReceiver<JobId>,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    tracker: TaskTracker,
}

impl Dispatcher {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let id = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(id) => id,
                    None => break,
                },
            };

            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            self.counters.running.fetch_add(1, Ordering::SeqCst);
            self.tracker.spawn(run_job(
                Arc::clone(&self.runner),
                id,
                permit,
                Arc::clone(&self.counters),
            ));
        }

        tracing::info!("Job dispatcher shutting down");
    }
}

/// Run one job on its own task so a panic is caught at the join point.
async fn run_job(
    runner: Arc<PipelineRunner>,
    id: JobId,
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
) {
    let task = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.run(id).await }
    });

    match task.await {
        Ok(RunOutcome::Completed(_)) => tracing::debug!(job_id = %id, "Run completed"),
        Ok(RunOutcome::Failed(failure)) => {
            tracing::debug!(job_id = %id, kind = ?failure.kind(), "Run failed")
        }
        Ok(RunOutcome::Abandoned) => tracing::debug!(job_id = %id, "Run abandoned"),
        Err(e) => {
            let reason = if e.is_panic() {
                "pipeline task panicked"
            } else {
                "pipeline task was cancelled"
            };
            tracing::error!(job_id = %id, error = %e, "{reason}");
            let failure = JobFailure::Internal(reason.to_string());
            if let Err(e) = runner.store().update(id, Transition::Fail(failure)).await {
                tracing::warn!(job_id = %id, error = %e, "Could not record failure for crashed run");
            }
        }
    }

    counters.running.fetch_sub(1, Ordering::SeqCst);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
