//! Environment-driven configuration.
//!
//! Both loaders panic on malformed values: misconfiguration should stop the
//! process at startup, not surface on the first request.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use animgen_llm::api::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use animgen_llm::generator::DEFAULT_TEXT_COLOR;
use animgen_pipeline::manim::{ManimConfig, ManimQuality};
use animgen_pipeline::runner::PhaseBudgets;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight renders (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Shown by the root welcome endpoint.
    pub app_title: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `8000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    /// | `APP_TITLE`             | `2D Animation AI`       |
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8000),
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 30),
            app_title: env_or("APP_TITLE", "2D Animation AI"),
        }
    }
}

/// Code generation, rendering and job lifecycle configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub animations_dir: PathBuf,
    pub manim_work_dir: PathBuf,
    /// Manim invocation, e.g. `["python", "-m", "manim"]`.
    pub manim_command: Vec<String>,
    pub manim_quality: ManimQuality,
    pub cleanup_temp_files: bool,
    /// Text color for the offline template generator.
    pub default_animation_color: String,
    pub max_concurrent_renders: usize,
    pub generation_timeout_secs: u64,
    pub render_timeout_secs: u64,
    /// Terminal jobs older than this are swept.
    pub job_retention_secs: u64,
    pub job_sweep_interval_secs: u64,
    /// `None` selects the offline template generator.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                     |
    /// |---------------------------|-----------------------------|
    /// | `ANIMATIONS_DIR`          | `animations`                |
    /// | `MANIM_WORK_DIR`          | `manim_work`                |
    /// | `MANIM_COMMAND`           | `manim`                     |
    /// | `MANIM_QUALITY`           | `low_quality`               |
    /// | `CLEANUP_TEMP_FILES`      | `true`                      |
    /// | `DEFAULT_ANIMATION_COLOR` | `BLUE`                      |
    /// | `MAX_CONCURRENT_RENDERS`  | `2`                         |
    /// | `GENERATION_TIMEOUT_SECS` | `120`                       |
    /// | `RENDER_TIMEOUT_SECS`     | `300`                       |
    /// | `JOB_RETENTION_SECS`      | `3600`                      |
    /// | `JOB_SWEEP_INTERVAL_SECS` | `60`                        |
    /// | `OPENAI_API_KEY`          | unset                       |
    /// | `OPENAI_BASE_URL`         | `https://api.openai.com/v1` |
    /// | `OPENAI_MODEL`            | `o4-mini`                   |
    pub fn from_env() -> Self {
        let manim_command = split_command(&env_or("MANIM_COMMAND", "manim"));
        assert!(!manim_command.is_empty(), "MANIM_COMMAND must not be empty");

        let cleanup_raw = env_or("CLEANUP_TEMP_FILES", "true");
        let cleanup_temp_files = parse_flag(&cleanup_raw)
            .unwrap_or_else(|| panic!("CLEANUP_TEMP_FILES must be a boolean, got '{cleanup_raw}'"));

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Self {
            animations_dir: PathBuf::from(env_or("ANIMATIONS_DIR", "animations")),
            manim_work_dir: PathBuf::from(env_or("MANIM_WORK_DIR", "manim_work")),
            manim_command,
            manim_quality: env_parse("MANIM_QUALITY", ManimQuality::Low),
            cleanup_temp_files,
            default_animation_color: env_or("DEFAULT_ANIMATION_COLOR", DEFAULT_TEXT_COLOR),
            max_concurrent_renders: env_parse("MAX_CONCURRENT_RENDERS", 2),
            generation_timeout_secs: env_parse("GENERATION_TIMEOUT_SECS", 120),
            render_timeout_secs: env_parse("RENDER_TIMEOUT_SECS", 300),
            job_retention_secs: env_parse("JOB_RETENTION_SECS", 3600),
            job_sweep_interval_secs: env_parse("JOB_SWEEP_INTERVAL_SECS", 60),
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            openai_model: env_or("OPENAI_MODEL", DEFAULT_MODEL),
        }
    }

    pub fn budgets(&self) -> PhaseBudgets {
        PhaseBudgets {
            generation: Duration::from_secs(self.generation_timeout_secs),
            render: Duration::from_secs(self.render_timeout_secs),
        }
    }

    pub fn manim_config(&self) -> ManimConfig {
        ManimConfig {
            command: self.manim_command.clone(),
            quality: self.manim_quality,
            work_dir: self.manim_work_dir.clone(),
            output_dir: self.animations_dir.clone(),
            cleanup_temp_files: self.cleanup_temp_files,
        }
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn job_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.job_sweep_interval_secs.max(1))
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} has an invalid value '{raw}': {e}")),
        Err(_) => default,
    }
}

/// Accepts the usual spellings: `true/false`, `1/0`, `yes/no`.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag(" yes "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("off"), None);
    }

    #[test]
    fn command_splits_on_whitespace() {
        assert_eq!(split_command("python  -m manim"), vec!["python", "-m", "manim"]);
        assert!(split_command("   ").is_empty());
    }
}
