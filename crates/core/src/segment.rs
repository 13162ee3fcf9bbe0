//! Segment analysis: which frame ranges need propagation, and from where.
//!
//! [`analyze`] is a pure function over the frames of one project (already
//! filtered to the active trim range). Each manually labeled frame that
//! carries point prompts seeds a forward window that ends at the earliest of
//! `source + max_propagation_length`, the frame before the next labeled
//! frame, or the last frame of the project. Inside that window, maximal runs
//! of eligible frames become [`PropagationSegment`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::frame::{LabeledFrame, PointPrompt};
use crate::types::{FrameNumber, LabelId};

/// Default reach of a single source frame, in frames.
pub const DEFAULT_MAX_PROPAGATION_LENGTH: u32 = 1000;

/// Propagation direction relative to the source frame.
///
/// Only `Forward` segments are produced by [`analyze`]; `Backward` is kept
/// so window arithmetic stays total over both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

/// A contiguous run of frames propagated from one source frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationSegment {
    /// First frame of the run (inclusive).
    pub start_frame: FrameNumber,
    /// Last frame of the run (inclusive).
    pub end_frame: FrameNumber,
    /// Manually labeled frame the prompts come from.
    pub source_frame: FrameNumber,
    pub direction: Direction,
    /// `end_frame - start_frame + 1`.
    pub num_frames: u32,
}

impl PropagationSegment {
    /// A forward segment covering `start..=end` seeded by `source`.
    pub fn forward(source_frame: FrameNumber, start_frame: FrameNumber, end_frame: FrameNumber) -> Self {
        Self {
            start_frame,
            end_frame,
            source_frame,
            direction: Direction::Forward,
            num_frames: end_frame - start_frame + 1,
        }
    }

    /// First frame of the inference window for this segment.
    pub fn window_start(&self) -> FrameNumber {
        match self.direction {
            Direction::Forward => self.source_frame,
            Direction::Backward => self.start_frame,
        }
    }

    /// Number of frames in the inference window, source frame included.
    ///
    /// The window always spans the source frame through the far end of the
    /// segment so the tracker can carry the object across any gap of
    /// already-valid frames.
    pub fn window_len(&self) -> u32 {
        match self.direction {
            Direction::Forward => self.end_frame - self.source_frame + 1,
            Direction::Backward => self.source_frame - self.start_frame + 1,
        }
    }

    /// Whether `frame` is one of the frames this segment writes.
    pub fn contains(&self, frame: FrameNumber) -> bool {
        (self.start_frame..=self.end_frame).contains(&frame)
    }
}

/// Prompts of one manually labeled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    pub frame_number: FrameNumber,
    pub points_by_label: BTreeMap<LabelId, Vec<PointPrompt>>,
}

impl SourceFrame {
    /// Labels with at least one point, in label order.
    pub fn prompted_labels(&self) -> impl Iterator<Item = (LabelId, &[PointPrompt])> {
        self.points_by_label
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(label, points)| (*label, points.as_slice()))
    }
}

/// Output of [`analyze`]: ordered segments plus the prompts of every
/// source frame that has any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentPlan {
    pub segments: Vec<PropagationSegment>,
    pub sources: BTreeMap<FrameNumber, SourceFrame>,
}

impl SegmentPlan {
    /// Sum of `num_frames` across all segments.
    pub fn total_frames(&self) -> u32 {
        self.segments.iter().map(|s| s.num_frames).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn source(&self, frame: FrameNumber) -> Option<&SourceFrame> {
        self.sources.get(&frame)
    }
}

/// Compute the propagation plan for one project.
///
/// `frames` may arrive in any order; duplicate frame numbers keep the last
/// occurrence.
pub fn analyze(frames: &[LabeledFrame], max_propagation_length: u32) -> SegmentPlan {
    let by_frame: BTreeMap<FrameNumber, &LabeledFrame> =
        frames.iter().map(|f| (f.frame_number, f)).collect();

    let Some(&project_max_frame) = by_frame.keys().next_back() else {
        return SegmentPlan::default();
    };

    let labeled: Vec<&LabeledFrame> = by_frame
        .values()
        .copied()
        .filter(|f| f.manually_labeled)
        .collect();

    let mut plan = SegmentPlan::default();

    for (i, source) in labeled.iter().enumerate() {
        if !source.has_points() {
            continue;
        }
        plan.sources.insert(
            source.frame_number,
            SourceFrame {
                frame_number: source.frame_number,
                points_by_label: source.points_by_label.clone(),
            },
        );

        let reach = source.frame_number.saturating_add(max_propagation_length);
        let end_frame = match labeled.get(i + 1) {
            Some(next) => reach.min(next.frame_number - 1),
            None => reach.min(project_max_frame),
        };
        if end_frame <= source.frame_number {
            continue;
        }

        let source_updated_at = source.prompts_updated_at();
        let eligible = (source.frame_number + 1..=end_frame).filter(|n| {
            by_frame
                .get(n)
                .is_some_and(|frame| frame.is_eligible(source_updated_at))
        });
        push_runs(&mut plan.segments, source.frame_number, eligible);
    }

    plan
}

/// Merge ascending frame numbers into maximal consecutive runs.
fn push_runs(
    segments: &mut Vec<PropagationSegment>,
    source_frame: FrameNumber,
    eligible: impl Iterator<Item = FrameNumber>,
) {
    let mut run: Option<(FrameNumber, FrameNumber)> = None;
    for frame in eligible {
        run = match run {
            Some((start, prev)) if frame == prev + 1 => Some((start, frame)),
            Some((start, prev)) => {
                segments.push(PropagationSegment::forward(source_frame, start, prev));
                Some((frame, frame))
            }
            None => Some((frame, frame)),
        };
    }
    if let Some((start, prev)) = run {
        segments.push(PropagationSegment::forward(source_frame, start, prev));
    }
}
