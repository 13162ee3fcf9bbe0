//! Project-level metadata consumed by the propagation engine.

use serde::{Deserialize, Serialize};

use crate::trim::trim_frame_bounds;
use crate::types::{FrameNumber, ProjectId};

/// Annotation workflow stage of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStage {
    Upload,
    Trim,
    ManualLabeling,
    Propagation,
    Validation,
    Export,
}

impl ProjectStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Trim => "trim",
            Self::ManualLabeling => "manual_labeling",
            Self::Propagation => "propagation",
            Self::Validation => "validation",
            Self::Export => "export",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Self::Upload),
            "trim" => Some(Self::Trim),
            "manual_labeling" => Some(Self::ManualLabeling),
            "propagation" => Some(Self::Propagation),
            "validation" => Some(Self::Validation),
            "export" => Some(Self::Export),
            _ => None,
        }
    }
}

/// The subset of a project record the engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub stage: ProjectStage,
    /// Trim range start in seconds.
    pub trim_start: Option<f64>,
    /// Trim range end in seconds.
    pub trim_end: Option<f64>,
    /// Source video frame rate.
    pub video_fps: Option<f64>,
    /// Source video frame count.
    pub video_frame_count: Option<u32>,
}

impl ProjectRecord {
    /// A project with no trim range and no video metadata.
    pub fn new(id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            stage: ProjectStage::ManualLabeling,
            trim_start: None,
            trim_end: None,
            video_fps: None,
            video_frame_count: None,
        }
    }

    /// Inclusive frame bounds of the active trim range, if any.
    pub fn trim_bounds(&self) -> Option<(FrameNumber, FrameNumber)> {
        trim_frame_bounds(
            self.trim_start,
            self.trim_end,
            self.video_fps,
            self.video_frame_count,
        )
    }
}
