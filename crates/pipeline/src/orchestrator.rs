//! Job orchestration: from a start request to persisted masks.
//!
//! [`PropagationOrchestrator::start`] validates the request and plans the
//! segments synchronously, then hands the run to a tracked background task.
//! The run drives one inference session per segment on a blocking worker.
//! Per-frame progress flows back from that worker over a channel; the job
//! task is the only place that mutates job state and publishes snapshots.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use segflow_core::error::CoreError;
use segflow_core::frame::LabeledFrame;
use segflow_core::progress::{JobStatus, ProgressTracker};
use segflow_core::project::ProjectStage;
use segflow_core::segment::{analyze, Direction, PropagationSegment, SegmentPlan, DEFAULT_MAX_PROPAGATION_LENGTH};
use segflow_core::store::LabelStore;
use segflow_core::trim::within_bounds;
use segflow_core::types::{FrameNumber, JobId, ProjectId};
use segflow_events::ProgressBroadcaster;
use segflow_inference::{InferenceError, InferenceManager};

use crate::job::PropagationJob;
use crate::persister::{extract_masks, MaskPersister, ObjectLabels};
use crate::registry::JobRegistry;
use crate::tasks::JobTasks;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of per-project data; frames live in `<root>/<project_id>/inference`.
    pub projects_root: PathBuf,
    /// Reach of one source frame when a request does not override it.
    pub max_propagation_length: u32,
}

impl PipelineConfig {
    pub fn new(projects_root: impl Into<PathBuf>) -> Self {
        Self {
            projects_root: projects_root.into(),
            max_propagation_length: DEFAULT_MAX_PROPAGATION_LENGTH,
        }
    }

    pub fn frames_dir(&self, project_id: ProjectId) -> PathBuf {
        self.projects_root.join(project_id.to_string()).join("inference")
    }
}

/// Answer to a successful start request.
#[derive(Debug, Clone, Serialize)]
pub struct StartedJob {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub status: JobStatus,
    pub total_segments: u32,
    pub total_frames: u32,
    pub message: String,
}

/// What every segment of one run shares.
struct RunContext<'a> {
    job_id: &'a str,
    project_id: ProjectId,
    frames_dir: PathBuf,
    started: Instant,
}

/// Progress of one frame, sent from the inference worker to the job task.
struct FrameProgress {
    frame_number: FrameNumber,
    fraction: f64,
}

pub struct PropagationOrchestrator {
    store: Arc<dyn LabelStore>,
    inference: Arc<InferenceManager>,
    broadcaster: Arc<ProgressBroadcaster>,
    persister: MaskPersister,
    registry: JobRegistry,
    tasks: JobTasks,
    config: PipelineConfig,
}

impl PropagationOrchestrator {
    pub fn new(
        store: Arc<dyn LabelStore>,
        inference: Arc<InferenceManager>,
        broadcaster: Arc<ProgressBroadcaster>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            persister: MaskPersister::new(Arc::clone(&store)),
            store,
            inference,
            broadcaster,
            registry: JobRegistry::new(),
            tasks: JobTasks::new(),
            config,
        }
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Plan and enqueue a propagation job for `project_id`.
    ///
    /// Fails without creating a job when the project is unknown, the
    /// override is zero, or there is nothing to propagate.
    pub async fn start(
        self: &Arc<Self>,
        project_id: ProjectId,
        max_propagation_length: Option<u32>,
    ) -> Result<StartedJob, CoreError> {
        let max_length = match max_propagation_length {
            Some(0) => {
                return Err(CoreError::Validation(
                    "max_propagation_length must be at least 1".into(),
                ))
            }
            Some(n) => n,
            None => self.config.max_propagation_length,
        };

        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Project", project_id))?;

        let bounds = project.trim_bounds();
        let frames: Vec<LabeledFrame> = self
            .store
            .list_frames(project_id)
            .await?
            .into_iter()
            .filter(|f| within_bounds(f.frame_number, bounds))
            .collect();

        let plan = analyze(&frames, max_length);
        if plan.segments.is_empty() {
            return Err(CoreError::InvalidState(
                "No propagation segments found. Ensure at least one frame is manually labeled.".into(),
            ));
        }
        if plan.sources.is_empty() {
            return Err(CoreError::InvalidState("No labeled points found on any frame.".into()));
        }

        let job_id = Uuid::new_v4().to_string();
        let job = PropagationJob::queued(job_id.clone(), project_id, plan.segments.clone());
        let started = StartedJob {
            job_id: job_id.clone(),
            project_id,
            status: JobStatus::Queued,
            total_segments: job.total_segments(),
            total_frames: job.total_frames,
            message: format!(
                "Propagation job started with {} segments and {} frames",
                job.total_segments(),
                job.total_frames
            ),
        };

        self.registry.insert(job).await;
        self.broadcaster.register(&job_id).await;

        tracing::info!(
            job_id = %job_id,
            project_id = %project_id,
            segments = started.total_segments,
            frames = started.total_frames,
            max_length,
            "Propagation job queued",
        );

        let this = Arc::clone(self);
        self.tasks.spawn(job_id.clone(), async move {
            let run = AssertUnwindSafe(Arc::clone(&this).run(job_id.clone(), project_id, plan));
            if let Err(panic) = run.catch_unwind().await {
                this.abandon(&job_id, panic_message(&*panic)).await;
            }
        });

        Ok(started)
    }

    /// Current record of `job_id`.
    pub async fn job(&self, job_id: &str) -> Option<PropagationJob> {
        self.registry.get(job_id).await
    }

    /// Number of job runs still in flight.
    pub fn active_jobs(&self) -> usize {
        self.tasks.active()
    }

    /// Forget terminal jobs that finished more than `max_age` ago, along
    /// with their listener sets. Returns how many were evicted.
    pub async fn evict_expired(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let expired = self
            .registry
            .evict_terminal_older_than(Utc::now() - max_age)
            .await;
        for job_id in &expired {
            self.broadcaster.remove_job(job_id).await;
        }
        expired.len()
    }

    /// Wait up to `timeout` for in-flight jobs, then abort the rest.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let active = self.tasks.active();
        if active > 0 {
            tracing::info!(active, "Waiting for propagation jobs to finish");
        }
        self.tasks.shutdown(timeout).await
    }

    async fn run(self: Arc<Self>, job_id: JobId, project_id: ProjectId, plan: SegmentPlan) {
        let mut tracker = ProgressTracker::new(
            job_id.clone(),
            project_id,
            plan.segments.len() as u32,
            plan.total_frames(),
        );

        if let Err(e) = self.registry.mark_running(&job_id, Utc::now()).await {
            tracing::error!(job_id = %job_id, error = %e, "Propagation job could not start");
            return;
        }
        tracing::info!(job_id = %job_id, project_id = %project_id, "Propagation job running");

        match self.run_segments(&job_id, project_id, &plan, &mut tracker).await {
            Ok(()) => self.finish(&job_id, project_id, &mut tracker).await,
            Err(e) => self.fail(&job_id, &tracker, &e).await,
        }
    }

    async fn run_segments(
        &self,
        job_id: &str,
        project_id: ProjectId,
        plan: &SegmentPlan,
        tracker: &mut ProgressTracker,
    ) -> Result<(), CoreError> {
        let frames_dir = self.config.frames_dir(project_id);
        if !tokio::fs::try_exists(&frames_dir).await.unwrap_or(false) {
            return Err(CoreError::ExecutionFailure(format!(
                "Inference directory not found: {}",
                frames_dir.display()
            )));
        }

        let ctx = RunContext {
            job_id,
            project_id,
            frames_dir,
            started: Instant::now(),
        };
        let total = plan.segments.len();
        for (index, segment) in plan.segments.iter().enumerate() {
            let objects = plan
                .source(segment.source_frame)
                .map(ObjectLabels::from_source)
                .unwrap_or_default();
            if objects.is_empty() {
                tracing::warn!(
                    job_id = %job_id,
                    source_frame = segment.source_frame,
                    "No prompts for segment source, skipping",
                );
                tracker.complete_segment(segment.num_frames);
                continue;
            }

            tracing::info!(
                job_id = %job_id,
                segment = index + 1,
                total,
                source_frame = segment.source_frame,
                start_frame = segment.start_frame,
                end_frame = segment.end_frame,
                "Propagating segment",
            );

            self.run_segment(&ctx, index as u32, segment, objects, tracker)
                .await?;
            tracker.complete_segment(segment.num_frames);
        }
        Ok(())
    }

    async fn run_segment(
        &self,
        ctx: &RunContext<'_>,
        index: u32,
        segment: &PropagationSegment,
        objects: ObjectLabels,
        tracker: &mut ProgressTracker,
    ) -> Result<(), CoreError> {
        if segment.direction == Direction::Backward {
            return Err(CoreError::InvalidState(
                "backward propagation is not supported".into(),
            ));
        }

        let mut session = self
            .inference
            .prepare(&ctx.frames_dir, segment.window_start(), segment.window_len())
            .await?;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let worker_segment = segment.clone();
        let worker = tokio::task::spawn_blocking(move || {
            for (object_id, _, prompts) in objects.iter() {
                session.add_prompt(0, object_id, prompts, true)?;
            }

            let mut writes = Vec::new();
            for frame in session.propagate()? {
                let frame = frame?;
                writes.extend(extract_masks(&worker_segment, &objects, &frame));
                let _ = progress_tx.send(FrameProgress {
                    frame_number: frame.frame_number,
                    fraction: frame.progress,
                });
            }
            session.release();
            Ok::<_, InferenceError>(writes)
        });

        while let Some(progress) = progress_rx.recv().await {
            let snapshot = tracker.running(
                index,
                segment.num_frames,
                progress.fraction,
                progress.frame_number,
                ctx.started.elapsed(),
            );
            if let Err(e) = self.registry.record_progress(ctx.job_id, snapshot.clone()).await {
                // The worker owns the session; let it finish and release the
                // device before the job fails.
                drop(progress_rx);
                let _ = worker.await;
                return Err(e);
            }
            self.broadcaster.publish(snapshot).await;
        }

        let writes = worker
            .await
            .map_err(|e| CoreError::ExecutionFailure(format!("inference worker failed: {e}")))??;
        self.persister
            .persist_segment(ctx.project_id, segment, writes)
            .await?;
        Ok(())
    }

    async fn finish(&self, job_id: &str, project_id: ProjectId, tracker: &mut ProgressTracker) {
        let snapshot = tracker.completed();
        if let Err(e) = self
            .registry
            .mark_completed(job_id, Utc::now(), snapshot.clone())
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Could not record job completion");
            return;
        }
        self.broadcaster.publish(snapshot).await;
        tracing::info!(job_id = %job_id, project_id = %project_id, "Propagation job completed");

        if let Err(e) = self
            .store
            .advance_stage(project_id, ProjectStage::Propagation)
            .await
        {
            tracing::error!(
                job_id = %job_id,
                project_id = %project_id,
                error = %e,
                "Failed to advance project stage",
            );
        }
    }

    async fn fail(&self, job_id: &str, tracker: &ProgressTracker, error: &CoreError) {
        tracing::error!(job_id = %job_id, error = %error, "Propagation job failed");
        let message = error.to_string();
        let snapshot = tracker.failed(message.clone());
        if let Err(e) = self
            .registry
            .mark_failed(job_id, Utc::now(), message, snapshot.clone())
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Could not record job failure");
            return;
        }
        self.broadcaster.publish(snapshot).await;
    }

    /// Record a job whose run panicked as failed, keeping the progress it
    /// had reached.
    async fn abandon(&self, job_id: &str, message: String) {
        tracing::error!(job_id = %job_id, error = %message, "Propagation job panicked");
        let Some(job) = self.registry.get(job_id).await else {
            return;
        };
        if job.status().is_terminal() {
            return;
        }

        let snapshot = match &job.progress {
            Some(last) => last.to_failed(message.clone()),
            None => ProgressTracker::new(
                job.job_id.clone(),
                job.project_id,
                job.total_segments(),
                job.total_frames,
            )
            .failed(message.clone()),
        };
        if let Err(e) = self
            .registry
            .mark_failed(job_id, Utc::now(), message, snapshot.clone())
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Could not record job failure");
            return;
        }
        self.broadcaster.publish(snapshot).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let cause = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("Propagation job panicked: {cause}")
}
