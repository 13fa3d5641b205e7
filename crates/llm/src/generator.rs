//! [`CodeGenerator`] implementations.

use animgen_core::collaborators::{CodeGenerator, GenerationError};
use animgen_core::source_check::find_source_problems;
use async_trait::async_trait;

use crate::api::{ChatApi, ChatApiError, ChatMessage};
use crate::prompt::{build_generation_prompt, extract_code, system_prompt};

/// Generates scene code by asking a chat-completion model.
pub struct LlmCodeGenerator {
    api: ChatApi,
    model: String,
}

impl LlmCodeGenerator {
    pub fn new(api: ChatApi, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
        }
    }
}

impl From<ChatApiError> for GenerationError {
    fn from(err: ChatApiError) -> Self {
        GenerationError::Upstream(err.to_string())
    }
}

#[async_trait]
impl CodeGenerator for LlmCodeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let messages = [
            ChatMessage::system(system_prompt()),
            ChatMessage::user(build_generation_prompt(prompt)),
        ];

        let response = self.api.complete(&self.model, &messages).await?;
        let content = response
            .first_content()
            .ok_or(GenerationError::EmptyResponse)?;

        let code = extract_code(content);
        if code.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        check_source(&code)?;

        tracing::debug!(model = %self.model, bytes = code.len(), "Scene code generated");
        Ok(code)
    }
}

/// Offline generator used when no model API key is configured.
///
/// Emits a fixed scene that writes the prompt text, scales it up and fades
/// it out.
pub struct TemplateCodeGenerator {
    color: String,
}

/// Manim color used when none is configured.
pub const DEFAULT_TEXT_COLOR: &str = "BLUE";

/// Longest prompt text rendered verbatim by the template scene.
const MAX_TEMPLATE_TEXT_CHARS: usize = 80;

impl TemplateCodeGenerator {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
        }
    }

    fn render_template(&self, text: &str) -> String {
        let text: String = text.trim().chars().take(MAX_TEMPLATE_TEXT_CHARS).collect();
        let literal = python_string_literal(&text);
        format!(
            "from manim import *\n\
             \n\
             class PromptScene(Scene):\n\
             \x20   def construct(self):\n\
             \x20       title = Text({literal}, color={color})\n\
             \x20       self.play(Write(title))\n\
             \x20       self.play(title.animate.scale(1.5))\n\
             \x20       self.play(FadeOut(title))\n",
            color = self.color,
        )
    }
}

impl Default for TemplateCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT_COLOR)
    }
}

#[async_trait]
impl CodeGenerator for TemplateCodeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let code = self.render_template(prompt);
        check_source(&code)?;
        Ok(code)
    }
}

fn check_source(code: &str) -> Result<(), GenerationError> {
    let problems = find_source_problems(code);
    if problems.is_empty() {
        Ok(())
    } else {
        tracing::warn!(problems = ?problems, "Generated code failed validation");
        Err(GenerationError::InvalidSource(problems.join(", ")))
    }
}

/// Quote `text` as a double-quoted Python string literal.
fn python_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
