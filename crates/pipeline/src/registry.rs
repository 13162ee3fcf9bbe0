//! Process-wide job registry.
//!
//! Jobs live in memory only and do not survive a restart. All state
//! changes go through the checked transitions below; callers never get a
//! mutable reference to a stored job.

use std::collections::HashMap;

use tokio::sync::RwLock;

use segflow_core::error::CoreError;
use segflow_core::progress::{JobStatus, ProgressSnapshot};
use segflow_core::types::{JobId, Timestamp};

use crate::job::{JobState, PropagationJob};

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, PropagationJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: PropagationJob) {
        self.jobs.write().await.insert(job.job_id.clone(), job);
    }

    /// A copy of the job as it is right now.
    pub async fn get(&self, job_id: &str) -> Option<PropagationJob> {
        self.jobs.read().await.get(job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// `Queued -> Running`.
    pub async fn mark_running(&self, job_id: &str, started_at: Timestamp) -> Result<(), CoreError> {
        self.transition(job_id, JobStatus::Running, |job| match job.state {
            JobState::Queued => {
                job.state = JobState::Running { started_at };
                true
            }
            _ => false,
        })
        .await
    }

    /// Store the latest snapshot of a running job.
    pub async fn record_progress(&self, job_id: &str, snapshot: ProgressSnapshot) -> Result<(), CoreError> {
        self.transition(job_id, JobStatus::Running, |job| match job.state {
            JobState::Running { .. } => {
                job.progress = Some(snapshot);
                true
            }
            _ => false,
        })
        .await
    }

    /// `Running -> Completed`, storing the final snapshot.
    pub async fn mark_completed(
        &self,
        job_id: &str,
        completed_at: Timestamp,
        snapshot: ProgressSnapshot,
    ) -> Result<(), CoreError> {
        self.transition(job_id, JobStatus::Completed, |job| match job.state {
            JobState::Running { started_at } => {
                job.state = JobState::Completed {
                    started_at,
                    completed_at,
                };
                job.progress = Some(snapshot);
                true
            }
            _ => false,
        })
        .await
    }

    /// `Queued | Running -> Failed`, storing the final snapshot.
    pub async fn mark_failed(
        &self,
        job_id: &str,
        failed_at: Timestamp,
        error: impl Into<String>,
        snapshot: ProgressSnapshot,
    ) -> Result<(), CoreError> {
        let error = error.into();
        self.transition(job_id, JobStatus::Failed, |job| {
            let started_at = match job.state {
                JobState::Queued => None,
                JobState::Running { started_at } => Some(started_at),
                _ => return false,
            };
            job.state = JobState::Failed {
                started_at,
                failed_at,
                error,
            };
            job.progress = Some(snapshot);
            true
        })
        .await
    }

    /// Drop terminal jobs that finished before `cutoff`. Returns their ids.
    pub async fn evict_terminal_older_than(&self, cutoff: Timestamp) -> Vec<JobId> {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.state.finished_at().is_some_and(|at| at < cutoff))
            .map(|job| job.job_id.clone())
            .collect();
        for job_id in &expired {
            jobs.remove(job_id);
        }
        expired
    }

    async fn transition<F>(&self, job_id: &str, target: JobStatus, apply: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut PropagationJob) -> bool,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::not_found("Job", job_id))?;
        let from = job.status();
        if apply(job) {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "job {job_id} cannot move from {} to {}",
                from.as_str(),
                target.as_str()
            )))
        }
    }
}
