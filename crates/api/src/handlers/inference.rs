//! Handler for the segmentation device status endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use segflow_inference::DeviceStatus;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InferenceStatusResponse {
    pub devices: Vec<DeviceStatus>,
    /// Device that propagation runs on.
    pub primary_device_id: Option<String>,
    pub inference_width: u32,
}

/// GET /inference/status
pub async fn get_inference_status(State(state): State<AppState>) -> Json<InferenceStatusResponse> {
    let devices = state.inference.status();
    let primary_device_id = devices
        .iter()
        .find(|d| d.primary)
        .map(|d| d.info.device_id.clone());

    Json(InferenceStatusResponse {
        devices,
        primary_device_id,
        inference_width: state.inference.inference_width(),
    })
}
