use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use animgen_core::artifact::ArtifactManager;
use animgen_core::collaborators::CodeGenerator;
use animgen_core::store::JobStore;
use animgen_llm::api::ChatApi;
use animgen_llm::{LlmCodeGenerator, TemplateCodeGenerator};
use animgen_pipeline::{ManimRenderer, PipelineRunner};
use animgen_worker::ExecutionBackend;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use animgen_api::app::build_app;
use animgen_api::background::job_retention;
use animgen_api::config::{PipelineConfig, ServerConfig};
use animgen_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "animgen_api=debug,animgen_pipeline=debug,animgen_worker=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline = PipelineConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(
        animations_dir = %pipeline.animations_dir.display(),
        manim_command = ?pipeline.manim_command,
        quality = ?pipeline.manim_quality,
        max_concurrent = pipeline.max_concurrent_renders,
        "Loaded pipeline configuration"
    );

    std::fs::create_dir_all(&pipeline.animations_dir)
        .expect("Failed to create animations directory");
    std::fs::create_dir_all(&pipeline.manim_work_dir)
        .expect("Failed to create Manim work directory");

    // --- Collaborators ---
    let generator: Arc<dyn CodeGenerator> = match &pipeline.openai_api_key {
        Some(key) => {
            tracing::info!(model = %pipeline.openai_model, "Using language model code generator");
            Arc::new(LlmCodeGenerator::new(
                ChatApi::new(pipeline.openai_base_url.clone(), key.clone()),
                pipeline.openai_model.clone(),
            ))
        }
        None => {
            tracing::warn!("OPENAI_API_KEY not set, using the template code generator");
            Arc::new(TemplateCodeGenerator::new(
                pipeline.default_animation_color.clone(),
            ))
        }
    };
    let renderer = Arc::new(ManimRenderer::new(pipeline.manim_config()));

    // --- Job store and execution backend ---
    let store = Arc::new(JobStore::new());
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&store),
        generator,
        renderer,
        pipeline.budgets(),
    ));
    let backend = Arc::new(ExecutionBackend::start(
        runner,
        pipeline.max_concurrent_renders,
    ));

    // --- Retention sweeper ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(job_retention::run(
        Arc::clone(&store),
        ArtifactManager::new(Arc::clone(&store)),
        pipeline.job_retention(),
        pipeline.job_sweep_interval(),
        retention_cancel.clone(),
    ));

    // --- App state and router ---
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let state = AppState::new(config, Arc::clone(&store), Arc::clone(&backend));
    let app = build_app(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention sweeper stopped");

    backend.shutdown(shutdown_timeout).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
