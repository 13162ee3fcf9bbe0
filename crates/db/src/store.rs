//! PostgreSQL-backed [`LabelStore`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use segflow_core::error::CoreError;
use segflow_core::frame::{LabeledFrame, PointPrompt, ValidationStatus};
use segflow_core::mask::MaskWrite;
use segflow_core::project::{ProjectRecord, ProjectStage};
use segflow_core::store::LabelStore;
use segflow_core::types::{FrameNumber, LabelId, ProjectId};

use crate::models::frame::{FramePoint, FrameState};
use crate::models::mask::UpsertMask;
use crate::models::project::Project;
use crate::repositories::{FrameRepo, MaskRepo, ProjectRepo};
use crate::DbPool;

/// [`LabelStore`] over the project database.
#[derive(Clone)]
pub struct PgLabelStore {
    pool: DbPool,
}

impl PgLabelStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl LabelStore for PgLabelStore {
    async fn ping(&self) -> Result<(), CoreError> {
        crate::health_check(&self.pool).await.map_err(db_error)
    }

    async fn find_project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>, CoreError> {
        ProjectRepo::find_by_id(&self.pool, project_id)
            .await
            .map_err(db_error)?
            .map(project_record)
            .transpose()
    }

    async fn list_frames(&self, project_id: ProjectId) -> Result<Vec<LabeledFrame>, CoreError> {
        let states = FrameRepo::list_states(&self.pool, project_id)
            .await
            .map_err(db_error)?;
        let points = FrameRepo::list_manual_points(&self.pool, project_id)
            .await
            .map_err(db_error)?;

        let mut points_by_frame = group_points(points)?;
        let frames = states
            .into_iter()
            .map(|state| {
                let frame_number = frame_number(state.frame_number)?;
                let points_by_label = if state.manually_labeled {
                    points_by_frame.remove(&frame_number).unwrap_or_default()
                } else {
                    BTreeMap::new()
                };
                Ok(labeled_frame(state, frame_number, points_by_label))
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        tracing::debug!(%project_id, frames = frames.len(), "Loaded frame states");
        Ok(frames)
    }

    async fn upsert_masks(&self, project_id: ProjectId, masks: &[MaskWrite]) -> Result<usize, CoreError> {
        let rows = masks
            .iter()
            .map(|m| {
                Ok(UpsertMask {
                    frame_number: i32::try_from(m.frame_number).map_err(|_| {
                        CoreError::Validation(format!("frame number {} out of range", m.frame_number))
                    })?,
                    label_id: m.label_id,
                    contour_polygon: m.contour.polygon.clone(),
                    area: m.contour.area,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let written = MaskRepo::upsert_batch(&self.pool, project_id, &rows)
            .await
            .map_err(db_error)?;
        if written < rows.len() as u64 {
            tracing::warn!(
                %project_id,
                requested = rows.len(),
                written,
                "Some masks addressed frames that no longer exist",
            );
        }
        Ok(written as usize)
    }

    async fn advance_stage(&self, project_id: ProjectId, stage: ProjectStage) -> Result<(), CoreError> {
        let found = ProjectRepo::set_stage(&self.pool, project_id, stage.as_str())
            .await
            .map_err(db_error)?;
        if !found {
            return Err(CoreError::not_found("Project", project_id));
        }
        Ok(())
    }
}

fn db_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CoreError::ResourceUnavailable(format!("database: {err}"))
        }
        sqlx::Error::RowNotFound => CoreError::not_found("Row", "query result"),
        other => CoreError::Internal(format!("database: {other}")),
    }
}

fn frame_number(raw: i32) -> Result<FrameNumber, CoreError> {
    FrameNumber::try_from(raw)
        .map_err(|_| CoreError::Internal(format!("negative frame number {raw} in store")))
}

fn project_record(row: Project) -> Result<ProjectRecord, CoreError> {
    let stage = ProjectStage::parse(&row.stage)
        .ok_or_else(|| CoreError::Internal(format!("unknown project stage '{}'", row.stage)))?;
    Ok(ProjectRecord {
        id: row.id,
        name: row.name,
        stage,
        trim_start: row.trim_start,
        trim_end: row.trim_end,
        video_fps: row.video_fps,
        video_frame_count: row.video_frame_count.and_then(|n| u32::try_from(n).ok()),
    })
}

fn group_points(
    points: Vec<FramePoint>,
) -> Result<HashMap<FrameNumber, BTreeMap<LabelId, Vec<PointPrompt>>>, CoreError> {
    let mut grouped: HashMap<FrameNumber, BTreeMap<LabelId, Vec<PointPrompt>>> = HashMap::new();
    for point in points {
        grouped
            .entry(frame_number(point.frame_number)?)
            .or_default()
            .entry(point.label_id)
            .or_default()
            .push(PointPrompt {
                x: point.x as f32,
                y: point.y as f32,
                include: point.include,
            });
    }
    Ok(grouped)
}

fn labeled_frame(
    state: FrameState,
    frame_number: FrameNumber,
    points_by_label: BTreeMap<LabelId, Vec<PointPrompt>>,
) -> LabeledFrame {
    LabeledFrame {
        frame_number,
        manually_labeled: state.manually_labeled,
        has_mask: state.has_mask,
        mask_updated_at: state.mask_updated_at,
        validation_status: ValidationStatus::parse(&state.validation),
        points_by_label,
        points_updated_at: state.points_updated_at,
        updated_at: Some(state.updated_at),
    }
}
