//! Pipeline runner: drives one job through code generation and rendering.
//!
//! Every transition is written to the [`JobStore`] before the next phase
//! starts, so status queries observe progress. Collaborator failures and
//! budget overruns end the job in `failed`; nothing here returns an error
//! to the caller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use animgen_core::collaborators::{CodeGenerator, Renderer};
use animgen_core::error::CoreError;
use animgen_core::job::{JobFailure, Phase, Transition};
use animgen_core::store::JobStore;
use animgen_core::types::JobId;

/// Default wall-clock budget for the code generation phase.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default wall-clock budget for the rendering phase.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-phase wall-clock budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseBudgets {
    pub generation: Duration,
    pub render: Duration,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            generation: DEFAULT_GENERATION_TIMEOUT,
            render: DEFAULT_RENDER_TIMEOUT,
        }
    }
}

/// How a single run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(PathBuf),
    Failed(JobFailure),
    /// The job was deleted (or was not runnable) before the run finished.
    Abandoned,
}

/// Runs jobs end to end against the configured collaborators.
pub struct PipelineRunner {
    store: Arc<JobStore>,
    generator: Arc<dyn CodeGenerator>,
    renderer: Arc<dyn Renderer>,
    budgets: PhaseBudgets,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<JobStore>,
        generator: Arc<dyn CodeGenerator>,
        renderer: Arc<dyn Renderer>,
        budgets: PhaseBudgets,
    ) -> Self {
        Self {
            store,
            generator,
            renderer,
            budgets,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Run job `id` to a terminal state.
    #[tracing::instrument(name = "pipeline_run", skip_all, fields(job_id = %id))]
    pub async fn run(&self, id: JobId) -> RunOutcome {
        let prompt = match self.store.get(id).await {
            Ok(record) => record.prompt().to_string(),
            Err(_) => {
                tracing::info!("Job removed before it started");
                return RunOutcome::Abandoned;
            }
        };

        // --- Code generation ---
        if !self.advance(id, Transition::StartGeneration).await {
            return RunOutcome::Abandoned;
        }
        tracing::info!("Generating scene code");

        let source = match tokio::time::timeout(
            self.budgets.generation,
            self.generator.generate(&prompt),
        )
        .await
        {
            Ok(Ok(source)) => source,
            Ok(Err(e)) => return self.fail(id, JobFailure::Generation(e.to_string())).await,
            Err(_) => {
                let failure = JobFailure::Timeout {
                    phase: Phase::CodeGeneration,
                    budget: self.budgets.generation,
                };
                return self.fail(id, failure).await;
            }
        };

        // --- Rendering ---
        if !self
            .advance(
                id,
                Transition::StartRendering {
                    source: source.clone(),
                },
            )
            .await
        {
            return RunOutcome::Abandoned;
        }
        tracing::info!(source_bytes = source.len(), "Rendering scene");

        let artifact_path =
            match tokio::time::timeout(self.budgets.render, self.renderer.render(id, &source))
                .await
            {
                Ok(Ok(path)) => path,
                Ok(Err(e)) => return self.fail(id, JobFailure::Render(e.to_string())).await,
                Err(_) => {
                    let failure = JobFailure::Timeout {
                        phase: Phase::Rendering,
                        budget: self.budgets.render,
                    };
                    return self.fail(id, failure).await;
                }
            };

        let completed = Transition::Complete {
            artifact_path: artifact_path.clone(),
        };
        if self.advance(id, completed).await {
            tracing::info!(path = %artifact_path.display(), "Animation completed");
            RunOutcome::Completed(artifact_path)
        } else {
            // Nobody can download it any more.
            if let Err(e) = tokio::fs::remove_file(&artifact_path).await {
                tracing::warn!(path = %artifact_path.display(), error = %e, "Failed to remove orphaned artifact");
            }
            RunOutcome::Abandoned
        }
    }

    /// Persist `transition`. Returns `false` if the job can no longer be
    /// advanced (deleted mid-flight, or in an unexpected state).
    async fn advance(&self, id: JobId, transition: Transition) -> bool {
        match self.store.update(id, transition).await {
            Ok(_) => true,
            Err(CoreError::NotFound { .. }) => {
                tracing::info!("Job deleted mid-flight, abandoning run");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Job could not be advanced, abandoning run");
                false
            }
        }
    }

    async fn fail(&self, id: JobId, failure: JobFailure) -> RunOutcome {
        tracing::warn!(kind = ?failure.kind(), error = %failure, "Job failed");
        if self.advance(id, Transition::Fail(failure.clone())).await {
            RunOutcome::Failed(failure)
        } else {
            RunOutcome::Abandoned
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
