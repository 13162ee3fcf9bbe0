//! Job status and progress snapshots.
//!
//! A [`ProgressSnapshot`] is immutable once built. Its `progress_percent` is
//! always derived from `frames_completed / total_frames` at construction, so
//! the two can never disagree. Snapshots are produced by a
//! [`ProgressTracker`], which owns the monotonic frame counter for one job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{FrameNumber, JobId, ProjectId};

/// Lifecycle status of a propagation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Point-in-time summary of a job's progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    job_id: JobId,
    project_id: ProjectId,
    status: JobStatus,
    /// 1-based index of the segment being processed; 0 before the first.
    current_segment: u32,
    total_segments: u32,
    current_frame: FrameNumber,
    frames_completed: u32,
    total_frames: u32,
    progress_percent: f64,
    /// `None` until at least one frame has been processed.
    estimated_remaining_ms: Option<u64>,
    error: Option<String>,
}

impl ProgressSnapshot {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn current_segment(&self) -> u32 {
        self.current_segment
    }

    pub fn total_segments(&self) -> u32 {
        self.total_segments
    }

    pub fn current_frame(&self) -> FrameNumber {
        self.current_frame
    }

    pub fn frames_completed(&self) -> u32 {
        self.frames_completed
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }

    pub fn estimated_remaining_ms(&self) -> Option<u64> {
        self.estimated_remaining_ms
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// This snapshot turned into a terminal failure carrying `error`.
    /// Counters stay where they were.
    pub fn to_failed(&self, error: impl Into<String>) -> ProgressSnapshot {
        ProgressSnapshot {
            status: JobStatus::Failed,
            estimated_remaining_ms: None,
            error: Some(error.into()),
            ..self.clone()
        }
    }
}

/// Builds the snapshots of one job and keeps `frames_completed`
/// non-decreasing and bounded by `total_frames`.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    job_id: JobId,
    project_id: ProjectId,
    total_segments: u32,
    total_frames: u32,
    /// Frames of fully finished segments.
    segment_frames_done: u32,
    /// Highest `frames_completed` reported so far.
    high_water: u32,
    current_segment: u32,
    current_frame: FrameNumber,
}

impl ProgressTracker {
    pub fn new(job_id: JobId, project_id: ProjectId, total_segments: u32, total_frames: u32) -> Self {
        Self {
            job_id,
            project_id,
            total_segments,
            total_frames,
            segment_frames_done: 0,
            high_water: 0,
            current_segment: 0,
            current_frame: 0,
        }
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    /// Snapshot for a job that has not started yet.
    pub fn queued(&self) -> ProgressSnapshot {
        self.build(JobStatus::Queued, 0, None, None)
    }

    /// Snapshot while segment `segment_index` (0-based) is being tracked.
    ///
    /// `fraction` is how far through the segment's inference window the
    /// device has progressed, in `0.0..=1.0`; `num_frames` is the segment's
    /// frame count. `elapsed` is the wall time since the job started.
    pub fn running(
        &mut self,
        segment_index: u32,
        num_frames: u32,
        fraction: f64,
        current_frame: FrameNumber,
        elapsed: Duration,
    ) -> ProgressSnapshot {
        let fraction = fraction.clamp(0.0, 1.0);
        let in_segment = (fraction * f64::from(num_frames)).floor() as u32;
        let done = self
            .segment_frames_done
            .saturating_add(in_segment.min(num_frames))
            .max(self.high_water)
            .min(self.total_frames);

        self.high_water = done;
        self.current_segment = segment_index + 1;
        self.current_frame = current_frame;

        let eta = estimate_remaining_ms(done, self.total_frames, elapsed);
        self.build(JobStatus::Running, done, eta, None)
    }

    /// Record that a segment of `num_frames` frames has been persisted.
    pub fn complete_segment(&mut self, num_frames: u32) {
        self.segment_frames_done = self
            .segment_frames_done
            .saturating_add(num_frames)
            .min(self.total_frames);
        self.high_water = self.high_water.max(self.segment_frames_done);
    }

    /// Final 100% snapshot.
    pub fn completed(&mut self) -> ProgressSnapshot {
        self.high_water = self.total_frames;
        self.current_segment = self.total_segments;
        self.current_frame = 0;
        self.build(JobStatus::Completed, self.total_frames, Some(0), None)
    }

    /// Final snapshot carrying the failure message. Progress stays where it
    /// was when the job stopped.
    pub fn failed(&self, error: impl Into<String>) -> ProgressSnapshot {
        self.build(JobStatus::Failed, self.high_water, None, Some(error.into()))
    }

    fn build(
        &self,
        status: JobStatus,
        frames_completed: u32,
        estimated_remaining_ms: Option<u64>,
        error: Option<String>,
    ) -> ProgressSnapshot {
        let progress_percent = if self.total_frames == 0 {
            if status == JobStatus::Completed { 100.0 } else { 0.0 }
        } else {
            f64::from(frames_completed) / f64::from(self.total_frames) * 100.0
        };

        ProgressSnapshot {
            job_id: self.job_id.clone(),
            project_id: self.project_id,
            status,
            current_segment: self.current_segment,
            total_segments: self.total_segments,
            current_frame: self.current_frame,
            frames_completed,
            total_frames: self.total_frames,
            progress_percent,
            estimated_remaining_ms,
            error,
        }
    }
}

/// `(total - done) / throughput`, with throughput in frames per second.
///
/// Zero elapsed time counts as a throughput of one frame per second.
/// Returns `None` while nothing has been processed.
pub fn estimate_remaining_ms(done: u32, total: u32, elapsed: Duration) -> Option<u64> {
    let remaining = total.saturating_sub(done);
    if remaining == 0 {
        return Some(0);
    }
    let secs = elapsed.as_secs_f64();
    let throughput = if secs > 0.0 { f64::from(done) / secs } else { 1.0 };
    if throughput <= 0.0 {
        return None;
    }
    Some((f64::from(remaining) / throughput * 1000.0).round() as u64)
}
