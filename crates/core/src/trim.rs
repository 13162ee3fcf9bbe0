//! Mapping a project's trim range (in seconds) onto frame numbers.

use crate::types::FrameNumber;

/// Inclusive `(start_frame, end_frame)` bounds for a trim range.
///
/// Returns `None` when the range is incomplete, the video metadata is not
/// usable, or the range collapses to nothing.
///
/// - `start = max(0, floor(trim_start * fps))`
/// - `end = min(max(0, floor(trim_end * fps) - 1), frame_count - 1)`
pub fn trim_frame_bounds(
    trim_start_secs: Option<f64>,
    trim_end_secs: Option<f64>,
    fps: Option<f64>,
    frame_count: Option<u32>,
) -> Option<(FrameNumber, FrameNumber)> {
    let (start_secs, end_secs) = (trim_start_secs?, trim_end_secs?);
    let fps = fps?;
    let frame_count = frame_count?;
    if fps <= 0.0 || frame_count == 0 {
        return None;
    }

    let start = (start_secs * fps).floor().max(0.0) as i64;
    let end = ((end_secs * fps).floor() as i64 - 1).max(0);
    let end = end.min(i64::from(frame_count) - 1);
    if end < start {
        return None;
    }
    Some((start as FrameNumber, end as FrameNumber))
}

/// Whether `frame` falls inside optional inclusive bounds.
pub fn within_bounds(frame: FrameNumber, bounds: Option<(FrameNumber, FrameNumber)>) -> bool {
    match bounds {
        Some((start, end)) => (start..=end).contains(&frame),
        None => true,
    }
}
