//! [`Renderer`] backed by the Manim command-line tool.
//!
//! Each render writes the scene source to `animation_<job_id>.py` under the
//! work directory, runs
//!
//! ```text
//! <command...> -q{l|m|h} --media_dir <work>/media <work>/code/animation_<id>.py <Scene>
//! ```
//!
//! and moves the produced `.mp4` to `<output_dir>/animation_<id>.mp4`.
//! The child process is killed if the render future is dropped (phase
//! budget exhausted).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use animgen_core::collaborators::{RenderError, Renderer};
use animgen_core::source_check::validate_scene_source;
use animgen_core::types::JobId;
use async_trait::async_trait;
use tokio::process::Command;

/// Maximum number of stderr bytes kept in a render failure message.
const MAX_STDERR_BYTES: usize = 2000;

/// Manim render quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManimQuality {
    #[default]
    Low,
    Medium,
    High,
}

impl ManimQuality {
    /// Command-line flag selecting this preset.
    pub fn flag(self) -> &'static str {
        match self {
            ManimQuality::Low => "-ql",
            ManimQuality::Medium => "-qm",
            ManimQuality::High => "-qh",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown Manim quality '{0}', expected low_quality, medium_quality or high_quality")]
pub struct UnknownQuality(String);

impl FromStr for ManimQuality {
    type Err = UnknownQuality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low_quality" | "low" | "l" => Ok(ManimQuality::Low),
            "medium_quality" | "medium" | "m" => Ok(ManimQuality::Medium),
            "high_quality" | "high" | "h" => Ok(ManimQuality::High),
            _ => Err(UnknownQuality(s.to_string())),
        }
    }
}

/// Settings for [`ManimRenderer`].
#[derive(Debug, Clone)]
pub struct ManimConfig {
    /// Program and leading arguments, e.g. `["manim"]` or `["python", "-m", "manim"]`.
    pub command: Vec<String>,
    pub quality: ManimQuality,
    /// Scratch space for scene scripts and Manim's media tree.
    pub work_dir: PathBuf,
    /// Where finished artifacts are placed.
    pub output_dir: PathBuf,
    /// Remove scripts and intermediate media after each render.
    pub cleanup_temp_files: bool,
}

impl Default for ManimConfig {
    fn default() -> Self {
        Self {
            command: vec!["manim".to_string()],
            quality: ManimQuality::Low,
            work_dir: PathBuf::from("manim_work"),
            output_dir: PathBuf::from("animations"),
            cleanup_temp_files: true,
        }
    }
}

/// Renders scenes by shelling out to Manim.
pub struct ManimRenderer {
    config: ManimConfig,
}

impl ManimRenderer {
    pub fn new(config: ManimConfig) -> Self {
        Self { config }
    }

    /// Final location of the artifact for `job_id`.
    pub fn artifact_path(&self, job_id: JobId) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.mp4", file_stem(job_id)))
    }

    fn script_path(&self, job_id: JobId) -> PathBuf {
        self.config
            .work_dir
            .join("code")
            .join(format!("{}.py", file_stem(job_id)))
    }

    fn media_dir(&self) -> PathBuf {
        self.config.work_dir.join("media")
    }

    /// Directory Manim writes this job's videos into.
    fn video_dir(&self, job_id: JobId) -> PathBuf {
        self.media_dir().join("videos").join(file_stem(job_id))
    }

    fn build_command(&self, script: &Path, scene: &str) -> Result<Command, RenderError> {
        let (program, leading_args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| RenderError::Spawn("empty Manim command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(leading_args)
            .arg(self.config.quality.flag())
            .arg("--media_dir")
            .arg(self.media_dir())
            .arg(script)
            .arg(scene)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl Renderer for ManimRenderer {
    async fn render(&self, job_id: JobId, source: &str) -> Result<PathBuf, RenderError> {
        let scene = validate_scene_source(source)
            .map_err(|e| RenderError::InvalidSource(e.to_string()))?
            .to_string();

        let script = self.script_path(job_id);
        let video_dir = self.video_dir(job_id);
        let _scratch = Scratch {
            paths: vec![script.clone(), video_dir.clone()],
            enabled: self.config.cleanup_temp_files,
        };

        if let Some(parent) = script.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&script, source).await?;

        let mut cmd = self.build_command(&script, &scene)?;
        tracing::debug!(job_id = %job_id, scene = %scene, command = ?cmd.as_std(), "Starting Manim");

        let output = cmd
            .output()
            .await
            .map_err(|e| RenderError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(RenderError::ProcessFailed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        tracing::debug!(
            job_id = %job_id,
            stdout = %String::from_utf8_lossy(&output.stdout),
            "Manim finished"
        );

        let rendered = find_rendered_video(&video_dir)
            .await?
            .ok_or(RenderError::MissingOutput)?;

        let dest = self.artifact_path(job_id);
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        move_file(&rendered, &dest).await?;

        tracing::info!(job_id = %job_id, path = %dest.display(), "Artifact written");
        Ok(dest)
    }
}

fn file_stem(job_id: JobId) -> String {
    format!("animation_{job_id}")
}

/// Keep the last [`MAX_STDERR_BYTES`] of stderr; Manim puts the Python
/// traceback at the end.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX_STDERR_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - MAX_STDERR_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Find the first `.mp4` in the quality subdirectories of `video_dir`
/// (Manim writes `<video_dir>/<resolution>/<Scene>.mp4`).
async fn find_rendered_video(video_dir: &Path) -> Result<Option<PathBuf>, RenderError> {
    let mut quality_dirs = match tokio::fs::read_dir(video_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = quality_dirs.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(entry.path()).await?;
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if file.file_type().await?.is_file()
                && path.extension().is_some_and(|ext| ext == "mp4")
            {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await
}

/// Removes per-job scratch files when dropped, including when the render
/// future is cancelled.
struct Scratch {
    paths: Vec<PathBuf>,
    enabled: bool,
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        for path in &self.paths {
            let result = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            if let Err(e) = result {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
