//! Code generation backends for the animation pipeline.
//!
//! Provides a chat-completion REST client, the Manim generation prompt,
//! and two [`CodeGenerator`](animgen_core::collaborators::CodeGenerator)
//! implementations: one backed by a language model, one offline template.

pub mod api;
pub mod generator;
pub mod prompt;

pub use generator::{LlmCodeGenerator, TemplateCodeGenerator};
