//! The label store seam.
//!
//! Frames, points, masks and project stages live in an external store. The
//! engine only talks to it through [`LabelStore`]; `segflow-db` provides the
//! PostgreSQL implementation and [`MemoryLabelStore`] backs tests and local
//! runs without a database.

mod memory;

pub use memory::MemoryLabelStore;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::frame::LabeledFrame;
use crate::mask::MaskWrite;
use crate::project::{ProjectRecord, ProjectStage};
use crate::types::ProjectId;

#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Cheap connectivity check.
    async fn ping(&self) -> Result<(), CoreError>;

    async fn find_project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>, CoreError>;

    /// Every frame of the project with its manual, mask and validation
    /// flags and the ordered points of each label, ascending by frame.
    async fn list_frames(&self, project_id: ProjectId) -> Result<Vec<LabeledFrame>, CoreError>;

    /// Replace the mask of each `(frame_number, label_id)` pair and reset
    /// the touched frames to `not_validated`, all in one commit.
    ///
    /// Writes for frames the project does not have are skipped. Returns the
    /// number of masks written.
    async fn upsert_masks(&self, project_id: ProjectId, masks: &[MaskWrite]) -> Result<usize, CoreError>;

    /// Move the project's workflow to `stage`.
    async fn advance_stage(&self, project_id: ProjectId, stage: ProjectStage) -> Result<(), CoreError>;
}
