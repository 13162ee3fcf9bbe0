//! Project model.

use segflow_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `projects` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub stage: String,
    pub propagation_visited: bool,
    pub trim_start: Option<f64>,
    pub trim_end: Option<f64>,
    pub video_fps: Option<f64>,
    pub video_frame_count: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
