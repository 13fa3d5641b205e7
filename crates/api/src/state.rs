use std::sync::Arc;

use animgen_core::artifact::ArtifactManager;
use animgen_core::store::JobStore;
use animgen_worker::ExecutionBackend;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// The single job registry shared with the pipeline workers.
    pub store: Arc<JobStore>,
    pub artifacts: ArtifactManager,
    pub backend: Arc<ExecutionBackend>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<JobStore>, backend: Arc<ExecutionBackend>) -> Self {
        Self {
            config: Arc::new(config),
            artifacts: ArtifactManager::new(Arc::clone(&store)),
            store,
            backend,
        }
    }
}
