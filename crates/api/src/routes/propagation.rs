use axum::routing::{get, post};
use axum::Router;

use crate::handlers::propagation;
use crate::state::AppState;
use crate::ws;

/// Propagation job routes.
///
/// ```text
/// POST   /projects/{project_id}/propagate             start_propagation
/// GET    /projects/{project_id}/propagate/{job_id}    get_propagation_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/{project_id}/propagate",
            post(propagation::start_propagation),
        )
        .route(
            "/projects/{project_id}/propagate/{job_id}",
            get(propagation::get_propagation_status),
        )
}

/// ```text
/// GET    /projects/{project_id}/propagate/{job_id}/ws progress_ws
/// ```
pub fn stream_router() -> Router<AppState> {
    Router::new().route(
        "/projects/{project_id}/propagate/{job_id}/ws",
        get(ws::progress_ws),
    )
}
