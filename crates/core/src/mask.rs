//! Mask records written back to the label store.

use serde::{Deserialize, Serialize};

use crate::types::{FrameNumber, LabelId};

/// Outer boundary of a mask region in original-resolution pixel
/// coordinates, with its enclosed area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskContour {
    /// Ordered `[x, y]` vertices. Never empty.
    pub polygon: Vec<[f64; 2]>,
    /// Polygon area in square pixels (`>= 0`).
    pub area: f64,
}

/// One mask upsert keyed by `(frame_number, label_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskWrite {
    pub frame_number: FrameNumber,
    pub label_id: LabelId,
    pub contour: MaskContour,
}
