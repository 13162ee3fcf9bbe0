//! Repository for per-frame labeling state (`images` and `labeled_points`).

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::frame::{FramePoint, FrameState};

/// Read-side queries over a project's frames.
pub struct FrameRepo;

impl FrameRepo {
    /// Every frame of a project with mask presence, newest mask update and
    /// newest point update, ascending by frame number.
    pub async fn list_states(pool: &PgPool, project_id: Uuid) -> Result<Vec<FrameState>, sqlx::Error> {
        sqlx::query_as::<_, FrameState>(
            "SELECT i.id, i.frame_number, i.manually_labeled, i.validation, i.updated_at, \
                    EXISTS (SELECT 1 FROM masks m WHERE m.image_id = i.id) AS has_mask, \
                    (SELECT MAX(m.updated_at) FROM masks m WHERE m.image_id = i.id) AS mask_updated_at, \
                    (SELECT MAX(p.updated_at) FROM labeled_points p WHERE p.image_id = i.id) AS points_updated_at \
             FROM images i \
             WHERE i.project_id = $1 \
             ORDER BY i.frame_number ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Point prompts of all manually labeled frames, grouped by frame and
    /// label and kept in placement order.
    pub async fn list_manual_points(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Vec<FramePoint>, sqlx::Error> {
        sqlx::query_as::<_, FramePoint>(
            "SELECT i.frame_number, p.label_id, p.x, p.y, p.include \
             FROM labeled_points p \
             JOIN images i ON i.id = p.image_id \
             WHERE i.project_id = $1 AND i.manually_labeled \
             ORDER BY i.frame_number ASC, p.label_id ASC, p.created_at ASC, p.id ASC",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }
}
