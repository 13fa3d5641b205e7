//! Structural and safety checks on generated Manim scene source.
//!
//! Generated code is executed by the renderer, so it must stay inside a
//! narrow envelope: imports from `manim` only, one `Scene` subclass with a
//! `construct` method, and no calls that reach the filesystem or evaluate
//! strings.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Manim classes the code generator is told it may use.
pub const ALLOWED_MANIM_CLASSES: &[&str] = &[
    "Scene",
    "Text",
    "Circle",
    "Square",
    "Rectangle",
    "Triangle",
    "Arrow",
    "Line",
    "Dot",
    "VGroup",
    "MathTex",
    "Tex",
    "Write",
    "FadeIn",
    "FadeOut",
    "GrowFromCenter",
    "Transform",
    "Create",
    "Uncreate",
    "DrawBorderThenFill",
];

/// Scene/mobject methods the code generator is told it may use.
pub const ALLOWED_MANIM_METHODS: &[&str] = &[
    "play",
    "wait",
    "add",
    "remove",
    "clear",
    "get_center",
    "shift",
    "scale",
    "rotate",
    "flip",
    "move_to",
    "next_to",
    "to_edge",
    "to_corner",
    "align_to",
    "arrange",
];

/// Calls that are rejected anywhere in the source.
pub const FORBIDDEN_CALLS: &[&str] = &["eval", "exec", "open", "system", "__import__"];

static SCENE_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)\s*\(\s*Scene\s*\)").expect("valid regex"));

static CONSTRUCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*def\s+construct\s*\(").expect("valid regex"));

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("valid regex"));

static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([\w.]+)\s+import\b").expect("valid regex"));

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\w+)\s*\(").expect("valid regex"));

/// Return the name of the first `Scene` subclass declared in `code`.
pub fn extract_scene_class(code: &str) -> Option<&str> {
    SCENE_CLASS_RE
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Collect every problem found in `code`. Empty means the source passed.
pub fn find_source_problems(code: &str) -> Vec<String> {
    let mut problems = Vec::new();

    for line in code.lines().map(code_portion) {
        let line = line.as_str();
        for statement in line.split(';').map(str::trim) {
            check_import(statement, &mut problems);
        }
        for cap in CALL_RE.captures_iter(line) {
            let Some(name) = cap.get(1) else { continue };
            // Attribute calls (`obj.open()`) are not the builtins.
            if line[..name.start()].ends_with('.') {
                continue;
            }
            let name = name.as_str();
            if FORBIDDEN_CALLS.contains(&name) {
                problems.push(format!("Unauthorized function call: {name}"));
            }
        }
    }

    if extract_scene_class(code).is_none() {
        problems.push("No Scene class found in the code".to_string());
    }
    if !CONSTRUCT_RE.is_match(code) {
        problems.push("No construct method found in the Scene class".to_string());
    }

    problems
}

/// Check one statement for imports of anything other than `manim`. Every
/// module of an `import a, b as c` list is checked.
fn check_import(statement: &str, problems: &mut Vec<String>) {
    if let Some(cap) = FROM_IMPORT_RE.captures(statement) {
        let module = &cap[1];
        if module != "manim" {
            problems.push(format!(
                "Only imports from manim are allowed, found: {module}"
            ));
        }
    } else if let Some(cap) = IMPORT_RE.captures(statement) {
        for part in cap[1].split(',') {
            let module = part.split_whitespace().next().unwrap_or_default();
            if module != "manim" {
                problems.push(format!("Only manim imports are allowed, found: {module}"));
            }
        }
    }
}

/// Return the code part of a single line: string literal contents are
/// blanked and a trailing `#` comment is dropped.
fn code_portion(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                    out.push(ch);
                }
            }
            None => match ch {
                '#' => break,
                '"' | '\'' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                c => out.push(c),
            },
        }
    }
    out
}

/// Validate `code` and return the scene class name to render.
pub fn validate_scene_source(code: &str) -> Result<&str, CoreError> {
    let problems = find_source_problems(code);
    if !problems.is_empty() {
        return Err(CoreError::Validation(problems.join(", ")));
    }
    extract_scene_class(code)
        .ok_or_else(|| CoreError::Validation("No Scene class found in the code".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
