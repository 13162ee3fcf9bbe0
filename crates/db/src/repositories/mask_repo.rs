//! Repository for the `masks` table.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::mask::{Mask, UpsertMask};

/// Column list for masks queries joined against `images`.
const COLUMNS: &str = "m.id, m.image_id, m.label_id, m.contour_polygon, m.area, \
    m.created_at, m.updated_at";

/// Mask writes and lookups.
pub struct MaskRepo;

impl MaskRepo {
    /// Upsert a batch of masks for one project in a single transaction and
    /// reset every touched frame to `not_validated`.
    ///
    /// Masks addressed to frame numbers the project does not have are
    /// skipped. Returns the number of masks written.
    pub async fn upsert_batch(
        pool: &PgPool,
        project_id: Uuid,
        masks: &[UpsertMask],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut written = 0;

        for mask in masks {
            let result = sqlx::query(
                "INSERT INTO masks (image_id, label_id, contour_polygon, area) \
                 SELECT i.id, $3, $4, $5 FROM images i \
                 WHERE i.project_id = $1 AND i.frame_number = $2 \
                 ON CONFLICT (image_id, label_id) DO UPDATE SET \
                    contour_polygon = EXCLUDED.contour_polygon, \
                    area = EXCLUDED.area, \
                    updated_at = now()",
            )
            .bind(project_id)
            .bind(mask.frame_number)
            .bind(mask.label_id)
            .bind(Json(&mask.contour_polygon))
            .bind(mask.area)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        let mut frames: Vec<i32> = masks.iter().map(|m| m.frame_number).collect();
        frames.sort_unstable();
        frames.dedup();
        sqlx::query(
            "UPDATE images SET validation = 'not_validated' \
             WHERE project_id = $1 AND frame_number = ANY($2)",
        )
        .bind(project_id)
        .bind(&frames)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(written)
    }

    /// All masks on one frame of a project.
    pub async fn list_by_frame(
        pool: &PgPool,
        project_id: Uuid,
        frame_number: i32,
    ) -> Result<Vec<Mask>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM masks m \
             JOIN images i ON i.id = m.image_id \
             WHERE i.project_id = $1 AND i.frame_number = $2 \
             ORDER BY m.label_id ASC"
        );
        sqlx::query_as::<_, Mask>(&query)
            .bind(project_id)
            .bind(frame_number)
            .fetch_all(pool)
            .await
    }
}
