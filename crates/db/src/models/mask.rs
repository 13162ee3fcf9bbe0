//! Mask model and upsert DTO.

use segflow_core::types::Timestamp;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `masks` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Mask {
    pub id: Uuid,
    pub image_id: Uuid,
    pub label_id: Uuid,
    pub contour_polygon: Json<Vec<[f64; 2]>>,
    pub area: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for one mask upsert, addressed by frame number within a project.
#[derive(Debug, Clone)]
pub struct UpsertMask {
    pub frame_number: i32,
    pub label_id: Uuid,
    pub contour_polygon: Vec<[f64; 2]>,
    pub area: f64,
}
