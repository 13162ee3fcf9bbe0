//! Repository for the `projects` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::project::Project;

/// Column list for projects queries.
const COLUMNS: &str = "id, name, stage, propagation_visited, trim_start, trim_end, \
    video_fps, video_frame_count, created_at, updated_at";

/// Reads and stage transitions for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a bare project in the given stage. Used by fixtures and
    /// seeding tools.
    pub async fn create(pool: &PgPool, name: &str, stage: &str) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (name, stage) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(name)
            .bind(stage)
            .fetch_one(pool)
            .await
    }

    /// Find a project by its ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Set the workflow stage. Entering `propagation` also marks the stage
    /// as visited so the UI keeps it reachable afterwards.
    ///
    /// Returns `true` if the project exists.
    pub async fn set_stage(pool: &PgPool, id: Uuid, stage: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET \
                stage = $2, \
                propagation_visited = propagation_visited OR $2 = 'propagation', \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(stage)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
