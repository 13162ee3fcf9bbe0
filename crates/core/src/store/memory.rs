use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::CoreError;
use crate::frame::{LabeledFrame, ValidationStatus};
use crate::mask::{MaskContour, MaskWrite};
use crate::project::{ProjectRecord, ProjectStage};
use crate::store::LabelStore;
use crate::types::{FrameNumber, LabelId, ProjectId};

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, ProjectRecord>,
    frames: HashMap<ProjectId, BTreeMap<FrameNumber, LabeledFrame>>,
    masks: HashMap<(ProjectId, FrameNumber, LabelId), MaskContour>,
    upsert_batches: usize,
    fail_writes: bool,
}

/// In-process [`LabelStore`] for tests and database-less runs.
#[derive(Default)]
pub struct MemoryLabelStore {
    inner: RwLock<Inner>,
}

impl MemoryLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, project: ProjectRecord) {
        self.write().projects.insert(project.id, project);
    }

    /// Insert or replace a frame of `project_id`.
    pub fn insert_frame(&self, project_id: ProjectId, frame: LabeledFrame) {
        self.write()
            .frames
            .entry(project_id)
            .or_default()
            .insert(frame.frame_number, frame);
    }

    pub fn frame(&self, project_id: ProjectId, frame_number: FrameNumber) -> Option<LabeledFrame> {
        self.read()
            .frames
            .get(&project_id)
            .and_then(|frames| frames.get(&frame_number))
            .cloned()
    }

    pub fn mask(
        &self,
        project_id: ProjectId,
        frame_number: FrameNumber,
        label_id: LabelId,
    ) -> Option<MaskContour> {
        self.read()
            .masks
            .get(&(project_id, frame_number, label_id))
            .cloned()
    }

    /// Frame numbers of `project_id` holding at least one stored mask.
    pub fn masked_frames(&self, project_id: ProjectId) -> Vec<FrameNumber> {
        let mut frames: Vec<FrameNumber> = self
            .read()
            .masks
            .keys()
            .filter(|(p, _, _)| *p == project_id)
            .map(|(_, f, _)| *f)
            .collect();
        frames.sort_unstable();
        frames.dedup();
        frames
    }

    pub fn stage(&self, project_id: ProjectId) -> Option<ProjectStage> {
        self.read().projects.get(&project_id).map(|p| p.stage)
    }

    /// Number of successful `upsert_masks` calls.
    pub fn upsert_batches(&self) -> usize {
        self.read().upsert_batches
    }

    /// Make every subsequent `upsert_masks` call fail.
    pub fn fail_writes(&self, fail: bool) {
        self.write().fail_writes = fail;
    }

    // A poisoned lock only means a test panicked mid-write; the maps are
    // still structurally valid.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LabelStore for MemoryLabelStore {
    async fn ping(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn find_project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>, CoreError> {
        Ok(self.read().projects.get(&project_id).cloned())
    }

    async fn list_frames(&self, project_id: ProjectId) -> Result<Vec<LabeledFrame>, CoreError> {
        Ok(self
            .read()
            .frames
            .get(&project_id)
            .map(|frames| frames.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_masks(&self, project_id: ProjectId, masks: &[MaskWrite]) -> Result<usize, CoreError> {
        let mut inner = self.write();
        if inner.fail_writes {
            return Err(CoreError::Internal("mask write rejected".into()));
        }

        let now = Utc::now();
        let mut written = 0;
        for write in masks {
            let Some(frame) = inner
                .frames
                .get_mut(&project_id)
                .and_then(|frames| frames.get_mut(&write.frame_number))
            else {
                continue;
            };
            frame.has_mask = true;
            frame.mask_updated_at = Some(now);
            frame.validation_status = ValidationStatus::NotValidated;

            inner.masks.insert(
                (project_id, write.frame_number, write.label_id),
                write.contour.clone(),
            );
            written += 1;
        }
        inner.upsert_batches += 1;
        Ok(written)
    }

    async fn advance_stage(&self, project_id: ProjectId, stage: ProjectStage) -> Result<(), CoreError> {
        let mut inner = self.write();
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| CoreError::not_found("Project", project_id))?;
        project.stage = stage;
        Ok(())
    }
}
