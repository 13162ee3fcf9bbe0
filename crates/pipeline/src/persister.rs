//! Turning propagated masks into stored contours.
//!
//! Contour extraction runs next to inference on the blocking worker
//! ([`extract_masks`]); the resulting writes for a segment are committed in
//! one batch by [`MaskPersister::persist_segment`] once the segment is done.

use std::sync::Arc;

use segflow_core::error::CoreError;
use segflow_core::frame::PointPrompt;
use segflow_core::mask::MaskWrite;
use segflow_core::segment::{PropagationSegment, SourceFrame};
use segflow_core::store::LabelStore;
use segflow_core::types::{LabelId, ProjectId};
use segflow_inference::contour::largest_contour;
use segflow_inference::PropagatedFrame;

/// Device object ids for the labels prompted on one source frame.
///
/// Object ids are 1-based positions in label order, stable for the
/// lifetime of one segment.
#[derive(Debug, Clone, Default)]
pub struct ObjectLabels {
    objects: Vec<(LabelId, Vec<PointPrompt>)>,
}

impl ObjectLabels {
    pub fn from_source(source: &SourceFrame) -> Self {
        Self {
            objects: source
                .prompted_labels()
                .map(|(label_id, points)| (label_id, points.to_vec()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn label_for(&self, object_id: u32) -> Option<LabelId> {
        let index = usize::try_from(object_id).ok()?.checked_sub(1)?;
        self.objects.get(index).map(|(label_id, _)| *label_id)
    }

    /// `(object_id, label_id, prompts)` in object order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, LabelId, &[PointPrompt])> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, (label_id, points))| (i as u32 + 1, *label_id, points.as_slice()))
    }
}

/// Mask writes for one propagated frame.
///
/// Frames outside the segment (including its source frame), objects that
/// map to no label and masks without a region produce nothing.
pub fn extract_masks(
    segment: &PropagationSegment,
    objects: &ObjectLabels,
    frame: &PropagatedFrame,
) -> Vec<MaskWrite> {
    if frame.frame_number == segment.source_frame || !segment.contains(frame.frame_number) {
        return Vec::new();
    }

    frame
        .masks
        .iter()
        .filter_map(|object| {
            let Some(label_id) = objects.label_for(object.object_id) else {
                tracing::debug!(object_id = object.object_id, "Ignoring mask for unknown object");
                return None;
            };
            let contour = largest_contour(&object.mask)?;
            Some(MaskWrite {
                frame_number: frame.frame_number,
                label_id,
                contour,
            })
        })
        .collect()
}

/// Commits a segment's masks to the label store.
pub struct MaskPersister {
    store: Arc<dyn LabelStore>,
}

impl MaskPersister {
    pub fn new(store: Arc<dyn LabelStore>) -> Self {
        Self { store }
    }

    /// Write every mask of `segment` in one batch.
    ///
    /// The source frame and frames outside the segment are never written.
    /// Returns the number of masks stored.
    pub async fn persist_segment(
        &self,
        project_id: ProjectId,
        segment: &PropagationSegment,
        mut writes: Vec<MaskWrite>,
    ) -> Result<usize, CoreError> {
        writes.retain(|w| w.frame_number != segment.source_frame && segment.contains(w.frame_number));
        if writes.is_empty() {
            tracing::debug!(
                project_id = %project_id,
                source_frame = segment.source_frame,
                "Segment produced no masks",
            );
            return Ok(0);
        }

        let written = self.store.upsert_masks(project_id, &writes).await?;
        tracing::info!(
            project_id = %project_id,
            source_frame = segment.source_frame,
            start_frame = segment.start_frame,
            end_frame = segment.end_frame,
            masks = written,
            "Segment masks saved",
        );
        Ok(written)
    }
}
