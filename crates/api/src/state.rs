use std::sync::Arc;

use segflow_core::store::LabelStore;
use segflow_inference::InferenceManager;
use segflow_pipeline::PropagationOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Label store (PostgreSQL in production).
    pub store: Arc<dyn LabelStore>,
    pub config: Arc<ServerConfig>,
    /// Segmentation devices, for the status endpoint.
    pub inference: Arc<InferenceManager>,
    /// Job orchestrator; also owns the progress broadcaster.
    pub orchestrator: Arc<PropagationOrchestrator>,
}
