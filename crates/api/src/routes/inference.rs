use axum::routing::get;
use axum::Router;

use crate::handlers::inference;
use crate::state::AppState;

/// Segmentation device routes.
///
/// ```text
/// GET    /inference/status    get_inference_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/inference/status", get(inference::get_inference_status))
}
