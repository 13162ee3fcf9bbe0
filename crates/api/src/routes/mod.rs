pub mod health;
pub mod inference;
pub mod propagation;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` HTTP route tree.
///
/// Route hierarchy:
///
/// ```text
/// /projects/{project_id}/propagate                 start job (POST)
/// /projects/{project_id}/propagate/{job_id}        job status
///
/// /inference/status                                device status
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(propagation::router())
        .merge(inference::router())
}

/// Long-lived `/api/v1` routes, mounted outside the request timeout.
///
/// ```text
/// /projects/{project_id}/propagate/{job_id}/ws     progress stream
/// ```
pub fn stream_routes() -> Router<AppState> {
    propagation::stream_router()
}
