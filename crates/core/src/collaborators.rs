//! Contracts for the two external collaborators driven by the pipeline.
//!
//! Implementations live outside this crate (`animgen-llm` for code
//! generation, `animgen-pipeline` for rendering); tests provide stubs.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::types::JobId;

/// Errors a [`CodeGenerator`] can report.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// The upstream model service failed (network, quota, non-2xx status).
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// The service answered but the response carried no usable code.
    #[error("empty response from model")]
    EmptyResponse,

    /// Generated source failed the safety/structure checks.
    #[error("generated code is invalid: {0}")]
    InvalidSource(String),
}

/// Errors a [`Renderer`] can report.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Source rejected before rendering started.
    #[error("source is not renderable: {0}")]
    InvalidSource(String),

    /// The render process could not be started.
    #[error("failed to launch renderer: {0}")]
    Spawn(String),

    /// The render process exited unsuccessfully.
    #[error("renderer exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    /// The render process succeeded but produced no artifact.
    #[error("no output video file found")]
    MissingOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a natural-language prompt into renderable scene source.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Renders scene source into an artifact file.
///
/// `job_id` is passed so the artifact path is unique per job.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, job_id: JobId, source: &str) -> Result<PathBuf, RenderError>;
}
