//! Per-frame labeling state as read from the label store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{FrameNumber, LabelId, Timestamp};

/// Review outcome recorded against a frame's masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    NotValidated,
    Passed,
    Failed,
}

impl ValidationStatus {
    /// Database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotValidated => "not_validated",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database representation. Unknown values read as
    /// `NotValidated`, which never makes a masked frame eligible.
    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => Self::Passed,
            "failed" => Self::Failed,
            _ => Self::NotValidated,
        }
    }
}

/// A single point prompt in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPrompt {
    /// Horizontal position in `0.0..=1.0`.
    pub x: f32,
    /// Vertical position in `0.0..=1.0`.
    pub y: f32,
    /// `true` for a positive (include) point, `false` for a negative one.
    pub include: bool,
}

impl PointPrompt {
    pub fn include(x: f32, y: f32) -> Self {
        Self { x, y, include: true }
    }

    pub fn exclude(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            include: false,
        }
    }
}

/// Everything the segment analyzer needs to know about one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFrame {
    pub frame_number: FrameNumber,
    /// Set when a user placed prompts on this frame by hand.
    pub manually_labeled: bool,
    /// Whether at least one mask exists for this frame.
    pub has_mask: bool,
    /// Newest mask update on this frame, if any mask exists.
    pub mask_updated_at: Option<Timestamp>,
    pub validation_status: ValidationStatus,
    /// Ordered point prompts grouped by label. Empty for frames that are
    /// not manually labeled.
    pub points_by_label: BTreeMap<LabelId, Vec<PointPrompt>>,
    /// Newest point update on this frame, if it has points.
    pub points_updated_at: Option<Timestamp>,
    /// Last update of the frame record itself.
    pub updated_at: Option<Timestamp>,
}

impl LabeledFrame {
    /// A blank frame: not labeled, no mask, not validated.
    pub fn new(frame_number: FrameNumber) -> Self {
        Self {
            frame_number,
            manually_labeled: false,
            has_mask: false,
            mask_updated_at: None,
            validation_status: ValidationStatus::NotValidated,
            points_by_label: BTreeMap::new(),
            points_updated_at: None,
            updated_at: None,
        }
    }

    /// The timestamp that represents the latest prompt edit on this frame.
    ///
    /// Falls back to the frame's own update time when no point carries a
    /// timestamp.
    pub fn prompts_updated_at(&self) -> Option<Timestamp> {
        self.points_updated_at.or(self.updated_at)
    }

    /// Whether any label on this frame has at least one point.
    pub fn has_points(&self) -> bool {
        self.points_by_label.values().any(|points| !points.is_empty())
    }

    /// Whether this frame should receive propagated masks from a source
    /// whose prompts were last edited at `source_prompts_updated_at`.
    ///
    /// A frame is eligible when it has no mask, or when its mask failed
    /// review and the source prompts are newer than that mask. Manually
    /// labeled frames are never overwritten.
    pub fn is_eligible(&self, source_prompts_updated_at: Option<Timestamp>) -> bool {
        if self.manually_labeled {
            return false;
        }
        if !self.has_mask {
            return true;
        }
        if self.validation_status != ValidationStatus::Failed {
            return false;
        }
        match (source_prompts_updated_at, self.mask_updated_at) {
            (Some(source), Some(mask)) => source > mask,
            _ => false,
        }
    }
}
