//! Propagation job records.

use chrono::Utc;
use serde::Serialize;

use segflow_core::progress::{JobStatus, ProgressSnapshot};
use segflow_core::segment::PropagationSegment;
use segflow_core::types::{JobId, ProjectId, Timestamp};

/// Lifecycle of a job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running {
        started_at: Timestamp,
    },
    Completed {
        started_at: Timestamp,
        completed_at: Timestamp,
    },
    Failed {
        /// `None` when the job failed before it started running.
        started_at: Option<Timestamp>,
        failed_at: Timestamp,
        error: String,
    },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Queued => JobStatus::Queued,
            Self::Running { .. } => JobStatus::Running,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        match self {
            Self::Queued => None,
            Self::Running { started_at } | Self::Completed { started_at, .. } => Some(*started_at),
            Self::Failed { started_at, .. } => *started_at,
        }
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        match self {
            Self::Completed { completed_at, .. } => Some(*completed_at),
            _ => None,
        }
    }

    /// When the job reached a terminal state.
    pub fn finished_at(&self) -> Option<Timestamp> {
        match self {
            Self::Completed { completed_at, .. } => Some(*completed_at),
            Self::Failed { failed_at, .. } => Some(*failed_at),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// One propagation run over a project.
#[derive(Debug, Clone)]
pub struct PropagationJob {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub state: JobState,
    pub segments: Vec<PropagationSegment>,
    pub total_frames: u32,
    /// Latest snapshot; `None` until the job reports progress.
    pub progress: Option<ProgressSnapshot>,
    pub created_at: Timestamp,
}

impl PropagationJob {
    pub fn queued(job_id: JobId, project_id: ProjectId, segments: Vec<PropagationSegment>) -> Self {
        let total_frames = segments.iter().map(|s| s.num_frames).sum();
        Self {
            job_id,
            project_id,
            state: JobState::Queued,
            segments,
            total_frames,
            progress: None,
            created_at: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn total_segments(&self) -> u32 {
        self.segments.len() as u32
    }
}
