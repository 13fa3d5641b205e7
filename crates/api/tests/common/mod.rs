#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use animgen_api::app::build_app;
use animgen_api::config::ServerConfig;
use animgen_api::state::AppState;
use animgen_core::collaborators::{CodeGenerator, GenerationError, RenderError, Renderer};
use animgen_core::store::JobStore;
use animgen_core::types::JobId;
use animgen_pipeline::{PhaseBudgets, PipelineRunner};
use animgen_worker::ExecutionBackend;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const SCENE_SOURCE: &str = "from manim import *\n\nclass RedCircle(Scene):\n    def construct(self):\n        self.play(Create(Circle(color=RED)))\n";

/// Prompts containing this marker make the stub generator fail.
pub const REJECT_MARKER: &str = "[reject]";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        app_title: "2D Animation AI".to_string(),
    }
}

/// Returns fixed scene source, or fails for prompts carrying [`REJECT_MARKER`].
pub struct StubGenerator;

#[async_trait]
impl CodeGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if prompt.contains(REJECT_MARKER) {
            return Err(GenerationError::InvalidSource(
                "Unauthorized function call: eval".into(),
            ));
        }
        Ok(SCENE_SOURCE.to_string())
    }
}

/// Writes a small fake video into `dir`.
pub struct StubRenderer {
    pub dir: PathBuf,
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, job_id: JobId, _source: &str) -> Result<PathBuf, RenderError> {
        let path = self.dir.join(format!("animation_{job_id}.mp4"));
        tokio::fs::write(&path, format!("fake-mp4:{job_id}")).await?;
        Ok(path)
    }
}

/// A router wired to stub collaborators, plus handles for assertions.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<JobStore>,
    pub backend: Arc<ExecutionBackend>,
    pub artifacts_dir: tempfile::TempDir,
}

/// Build the full application router (same middleware stack as the binary)
/// backed by stub collaborators and a temporary artifacts directory.
pub fn build_test_app() -> TestApp {
    let artifacts_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JobStore::new());

    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&store),
        Arc::new(StubGenerator),
        Arc::new(StubRenderer {
            dir: artifacts_dir.path().to_path_buf(),
        }),
        PhaseBudgets::default(),
    ));
    let backend = Arc::new(ExecutionBackend::start(runner, 2));

    let state = AppState::new(test_config(), Arc::clone(&store), Arc::clone(&backend));

    TestApp {
        router: build_app(state),
        store,
        backend,
        artifacts_dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Job helpers
// ---------------------------------------------------------------------------

/// Submit `prompt` and return the new job id.
pub async fn submit(app: &Router, prompt: &str) -> String {
    let response = post_json(app, "/api/v1/animations", serde_json::json!({ "prompt": prompt })).await;
    assert_eq!(response.status(), axum::http::StatusCode::ACCEPTED);
    let json = body_json(response).await;
    json["data"]["job_id"].as_str().unwrap().to_string()
}

/// Poll the status endpoint until the job is `completed` or `failed`.
pub async fn wait_for_terminal(app: &Router, id: &str) -> Value {
    for _ in 0..500 {
        let json = body_json(get(app, &format!("/api/v1/animations/{id}")).await).await;
        let state = json["data"]["state"].as_str().unwrap_or_default();
        if state == "completed" || state == "failed" {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

/// Wait until `id` is no longer listed.
pub async fn wait_until_unlisted(app: &Router, id: &str) {
    for _ in 0..500 {
        let json = body_json(get(app, "/api/v1/animations").await).await;
        let listed = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|job| job["job_id"] == id);
        if !listed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} is still listed");
}
