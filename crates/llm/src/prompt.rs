//! Prompt construction and response cleanup for Manim code generation.

use animgen_core::source_check::{ALLOWED_MANIM_CLASSES, ALLOWED_MANIM_METHODS};

const SYSTEM_PROMPT: &str = "You are an expert Python developer specializing in the Manim \
mathematical animation library. You write clean, well-structured scene code that renders \
without errors.";

/// Build the user message asking for a scene matching `description`.
pub fn build_generation_prompt(description: &str) -> String {
    format!(
        "Generate Python code for a Manim animation matching the description below.\n\
         \n\
         Requirements:\n\
         - Use `from manim import *` as the only import.\n\
         - Define exactly one class deriving from `Scene` with a `construct` method.\n\
         - Only use these Manim classes: {classes}\n\
         - Only use these Manim methods: {methods}\n\
         - No file, network or system operations; never call eval, exec, open or __import__.\n\
         - Keep every object inside the visible frame, spaced with `buff`, `arrange` and `next_to`.\n\
         - Pace the animation with `self.wait()` and fade objects out at the end.\n\
         \n\
         Description of the desired animation:\n\
         {description}\n\
         \n\
         Return ONLY the Python code, without explanation or Markdown formatting.",
        classes = ALLOWED_MANIM_CLASSES.join(", "),
        methods = ALLOWED_MANIM_METHODS.join(", "),
        description = description.trim(),
    )
}

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Strip a surrounding Markdown code fence from a model response.
///
/// Models frequently wrap code in ```` ```python ```` fences despite being
/// told not to. Only the first fenced block is kept; unfenced text is
/// returned trimmed.
pub fn extract_code(response: &str) -> String {
    let trimmed = response.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_fence = &trimmed[start + 3..];
    // Skip the language tag on the opening fence line.
    let body = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence,
    };
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}
