//! Job execution pipeline: the per-job runner and the Manim renderer.

pub mod manim;
pub mod runner;

pub use manim::{ManimConfig, ManimQuality, ManimRenderer};
pub use runner::{PhaseBudgets, PipelineRunner, RunOutcome};
