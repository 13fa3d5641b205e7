//! Job record and its lifecycle state machine.
//!
//! A job moves strictly forward:
//!
//! ```text
//! pending -> generating_code -> rendering -> completed
//!    \              \               \
//!     +--------------+---------------+----> failed
//! ```
//!
//! The lifecycle position is held in a private [`JobPhase`] whose terminal
//! variants carry their payload (artifact path or failure), so a record can
//! never hold both an artifact and an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{new_job_id, JobId, Timestamp};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Externally visible job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    GeneratingCode,
    Rendering,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::GeneratingCode => "generating_code",
            JobState::Rendering => "rendering",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Short human-readable description used in status responses.
    pub fn message(self) -> &'static str {
        match self {
            JobState::Pending => "Animation request received",
            JobState::GeneratingCode => "Generating animation code",
            JobState::Rendering => "Rendering animation",
            JobState::Completed => "Animation ready for download",
            JobState::Failed => "Animation generation failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// One of the two sequential pipeline steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    CodeGeneration,
    Rendering,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::CodeGeneration => f.write_str("code generation"),
            Phase::Rendering => f.write_str("rendering"),
        }
    }
}

/// Machine-readable class of a [`JobFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Generation,
    Render,
    Timeout,
    Internal,
}

/// Why a job ended in the `failed` state.
///
/// The `Display` output is what clients see as `error_detail`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Timed out: {phase} exceeded its {}s budget", .budget.as_secs())]
    Timeout { phase: Phase, budget: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobFailure::Generation(_) => FailureKind::Generation,
            JobFailure::Render(_) => FailureKind::Render,
            JobFailure::Timeout { .. } => FailureKind::Timeout,
            JobFailure::Internal(_) => FailureKind::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// A forward step applied to a job by the pipeline runner.
#[derive(Debug, Clone)]
pub enum Transition {
    /// `pending -> generating_code`.
    StartGeneration,
    /// `generating_code -> rendering`, storing the generated source.
    StartRendering { source: String },
    /// `rendering -> completed`.
    Complete { artifact_path: PathBuf },
    /// Any non-terminal state `-> failed`.
    Fail(JobFailure),
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Transition::StartGeneration => "start_generation",
            Transition::StartRendering { .. } => "start_rendering",
            Transition::Complete { .. } => "complete",
            Transition::Fail(_) => "fail",
        }
    }
}

#[derive(Debug, Clone)]
enum JobPhase {
    Pending,
    GeneratingCode,
    Rendering,
    Completed { artifact_path: PathBuf },
    Failed { failure: JobFailure },
}

impl JobPhase {
    fn state(&self) -> JobState {
        match self {
            JobPhase::Pending => JobState::Pending,
            JobPhase::GeneratingCode => JobState::GeneratingCode,
            JobPhase::Rendering => JobState::Rendering,
            JobPhase::Completed { .. } => JobState::Completed,
            JobPhase::Failed { .. } => JobState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One animation request and its tracked lifecycle.
#[derive(Debug, Clone)]
pub struct JobRecord {
    id: JobId,
    prompt: String,
    phase: JobPhase,
    generated_source: Option<String>,
    served_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl JobRecord {
    /// Create a fresh `pending` record with a newly allocated id.
    pub fn new(prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_job_id(),
            prompt: prompt.into(),
            phase: JobPhase::Pending,
            generated_source: None,
            served_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn state(&self) -> JobState {
        self.phase.state()
    }

    pub fn generated_source(&self) -> Option<&str> {
        self.generated_source.as_deref()
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        match &self.phase {
            JobPhase::Completed { artifact_path } => Some(artifact_path),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.phase {
            JobPhase::Failed { failure } => Some(failure),
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }

    pub fn is_served(&self) -> bool {
        self.served_at.is_some()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            state: self.state(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply a forward transition.
    ///
    /// Returns [`CoreError::Conflict`] if the transition is not legal from the
    /// current state; the record is left untouched in that case.
    pub fn apply(&mut self, transition: Transition) -> Result<(), CoreError> {
        let next = match (&self.phase, transition) {
            (JobPhase::Pending, Transition::StartGeneration) => JobPhase::GeneratingCode,
            (JobPhase::GeneratingCode, Transition::StartRendering { source }) => {
                self.generated_source = Some(source);
                JobPhase::Rendering
            }
            (JobPhase::Rendering, Transition::Complete { artifact_path }) => {
                JobPhase::Completed { artifact_path }
            }
            (phase, Transition::Fail(failure)) if !phase.state().is_terminal() => {
                JobPhase::Failed { failure }
            }
            (phase, transition) => {
                return Err(CoreError::Conflict(format!(
                    "cannot apply {} to job {} in state {}",
                    transition.name(),
                    self.id,
                    phase.state(),
                )));
            }
        };

        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark a completed artifact as handed to a downloader.
    pub fn mark_served(&mut self) -> Result<(), CoreError> {
        match self.state() {
            JobState::Completed if self.is_served() => Err(CoreError::AlreadyServed(format!(
                "Animation {} has already been downloaded",
                self.id
            ))),
            JobState::Completed => {
                let now = Utc::now();
                self.served_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            JobState::Failed => Err(CoreError::NotReady(format!(
                "Animation {} failed and has no artifact",
                self.id
            ))),
            state => Err(CoreError::NotReady(format!(
                "Animation {} is not ready yet (state: {state})",
                self.id
            ))),
        }
    }
}

/// List view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub state: JobState,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn rendering_record() -> JobRecord {
        let mut job = JobRecord::new("draw a red circle");
        job.apply(Transition::StartGeneration).unwrap();
        job.apply(Transition::StartRendering {
            source: "class A(Scene): ...".into(),
        })
        .unwrap();
        job
    }

    #[test]
    fn new_record_is_pending_without_payloads() {
        let job = JobRecord::new("hello");
        assert_eq!(job.state(), JobState::Pending);
        assert_eq!(job.prompt(), "hello");
        assert!(job.generated_source().is_none());
        assert!(job.artifact_path().is_none());
        assert!(job.error_detail().is_none());
        assert_eq!(job.created_at(), job.updated_at());
    }

    #[test]
    fn ids_are_unique() {
        let a = JobRecord::new("a");
        let b = JobRecord::new("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn happy_path_walks_forward() {
        let mut job = rendering_record();
        assert_eq!(job.state(), JobState::Rendering);
        assert_eq!(job.generated_source(), Some("class A(Scene): ..."));

        job.apply(Transition::Complete {
            artifact_path: PathBuf::from("animations/a.mp4"),
        })
        .unwrap();

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.artifact_path(), Some(Path::new("animations/a.mp4")));
        assert!(job.error_detail().is_none());
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let mut job = JobRecord::new("x");
        let err = job
            .apply(Transition::StartRendering { source: "s".into() })
            .unwrap_err();
        assert_matches!(err, CoreError::Conflict(_));
        assert_eq!(job.state(), JobState::Pending);
        assert!(job.generated_source().is_none());
    }

    #[test]
    fn backward_transition_is_rejected() {
        let mut job = rendering_record();
        assert_matches!(
            job.apply(Transition::StartGeneration),
            Err(CoreError::Conflict(_))
        );
        assert_eq!(job.state(), JobState::Rendering);
    }

    #[test]
    fn terminal_states_reject_failure() {
        let mut job = rendering_record();
        job.apply(Transition::Complete {
            artifact_path: PathBuf::from("a.mp4"),
        })
        .unwrap();
        assert_matches!(
            job.apply(Transition::Fail(JobFailure::Internal("late".into()))),
            Err(CoreError::Conflict(_))
        );
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn render_failure_keeps_generated_source() {
        let mut job = rendering_record();
        job.apply(Transition::Fail(JobFailure::Render("exit code 1".into())))
            .unwrap();

        assert_eq!(job.state(), JobState::Failed);
        assert!(job.generated_source().is_some());
        assert!(job.artifact_path().is_none());
        assert_eq!(
            job.error_detail().as_deref(),
            Some("Rendering failed: exit code 1")
        );
        assert_eq!(job.failure().map(JobFailure::kind), Some(FailureKind::Render));
    }

    #[test]
    fn timeout_detail_names_phase_and_budget() {
        let failure = JobFailure::Timeout {
            phase: Phase::Rendering,
            budget: Duration::from_secs(300),
        };
        assert_eq!(
            failure.to_string(),
            "Timed out: rendering exceeded its 300s budget"
        );
        assert_eq!(failure.kind(), FailureKind::Timeout);
    }

    #[test]
    fn mark_served_only_once() {
        let mut job = rendering_record();
        assert_matches!(job.mark_served(), Err(CoreError::NotReady(_)));

        job.apply(Transition::Complete {
            artifact_path: PathBuf::from("a.mp4"),
        })
        .unwrap();
        job.mark_served().unwrap();
        assert!(job.is_served());
        assert_matches!(job.mark_served(), Err(CoreError::AlreadyServed(_)));
    }

    #[test]
    fn failed_job_is_never_ready() {
        let mut job = JobRecord::new("x");
        job.apply(Transition::Fail(JobFailure::Generation("quota".into())))
            .unwrap();
        assert_matches!(job.mark_served(), Err(CoreError::NotReady(msg)) if msg.contains("failed"));
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(JobState::GeneratingCode).unwrap(),
            "generating_code"
        );
        assert_eq!(
            serde_json::to_value(FailureKind::Timeout).unwrap(),
            "timeout"
        );
    }
}
