//! Frame (image) state and point prompt rows.

use segflow_core::types::Timestamp;
use sqlx::FromRow;
use uuid::Uuid;

/// One frame of a project with its mask and prompt timestamps folded in.
#[derive(Debug, Clone, FromRow)]
pub struct FrameState {
    pub id: Uuid,
    pub frame_number: i32,
    pub manually_labeled: bool,
    pub validation: String,
    pub has_mask: bool,
    pub mask_updated_at: Option<Timestamp>,
    pub points_updated_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// One point prompt joined with the frame it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct FramePoint {
    pub frame_number: i32,
    pub label_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub include: bool,
}
