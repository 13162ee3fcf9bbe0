mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use segflow_core::error::CoreError;
use segflow_core::progress::JobStatus;
use segflow_core::project::{ProjectRecord, ProjectStage};
use uuid::Uuid;

use common::{assert_monotonic, label, FakeDevice, Fixture};

// ---------------------------------------------------------------------------
// Test: start request validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_project_is_not_found() {
    let fx = Fixture::new();

    let err = fx.orchestrator.start(Uuid::new_v4(), None).await.unwrap_err();

    assert_matches!(err, CoreError::NotFound { entity: "Project", .. });
}

#[tokio::test]
async fn zero_max_length_is_rejected() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[(0, &[label(1)])]);

    let err = fx.orchestrator.start(project_id, Some(0)).await.unwrap_err();

    assert_matches!(err, CoreError::Validation(_));
}

#[tokio::test]
async fn project_without_labels_is_rejected() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[]);

    let err = fx.orchestrator.start(project_id, None).await.unwrap_err();

    assert_matches!(err, CoreError::InvalidState(msg) if msg.contains("No propagation segments"));
    assert_eq!(fx.orchestrator.active_jobs(), 0);
}

#[tokio::test]
async fn labeled_frame_without_points_is_rejected() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[(0, &[])]);

    let err = fx.orchestrator.start(project_id, None).await.unwrap_err();

    assert_matches!(err, CoreError::InvalidState(_));
}

#[tokio::test]
async fn single_labeled_last_frame_is_rejected() {
    let fx = Fixture::new();
    let project_id = fx.add_project(5, &[(4, &[label(1)])]);

    let err = fx.orchestrator.start(project_id, None).await.unwrap_err();

    assert_matches!(err, CoreError::InvalidState(_));
    assert!(fx.device_calls().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a job runs to completion
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn job_propagates_and_persists_masks() {
    let fx = Fixture::new();
    let (a, b) = (label(1), label(2));
    let project_id = fx.add_project(6, &[(0, &[a, b])]);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    assert_eq!(started.status, JobStatus::Queued);
    assert_eq!(started.total_segments, 1);
    assert_eq!(started.total_frames, 5);
    assert_eq!(started.message, "Propagation job started with 1 segments and 5 frames");

    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_monotonic(&snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.status(), JobStatus::Completed);
    assert_eq!(last.frames_completed(), 5);
    assert_eq!(last.progress_percent(), 100.0);
    assert_eq!(last.estimated_remaining_ms(), Some(0));
    assert!(snapshots.iter().all(|s| s.job_id() == started.job_id));

    assert_eq!(fx.store.masked_frames(project_id), vec![1, 2, 3, 4, 5]);
    assert!(fx.store.mask(project_id, 0, a).is_none());
    assert_eq!(fx.store.mask(project_id, 3, b).unwrap().area, 49.0);
    assert_eq!(fx.store.upsert_batches(), 1);
    assert_eq!(fx.store.stage(project_id), Some(ProjectStage::Propagation));

    assert_eq!(
        fx.device_calls(),
        vec![
            "init 6".to_string(),
            "points 0 1 1 true".to_string(),
            "points 0 2 1 true".to_string(),
            "propagate 6".to_string(),
            "reset".to_string(),
        ]
    );

    let job = fx.orchestrator.job(&started.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.state.started_at().is_some());
    assert!(job.state.completed_at().is_some());
    assert_eq!(job.progress.unwrap().status(), JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread")]
async fn segments_run_in_order_with_one_batch_each() {
    let fx = Fixture::new();
    let project_id = fx.add_project(40, &[(0, &[label(1)]), (20, &[label(1)])]);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    assert_eq!(started.total_segments, 2);
    assert_eq!(started.total_frames, 38);

    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_monotonic(&snapshots);
    assert_eq!(snapshots.last().unwrap().current_segment(), 2);
    let expected: Vec<u32> = (1..20).chain(21..40).collect();
    assert_eq!(fx.store.masked_frames(project_id), expected);
    assert_eq!(fx.store.upsert_batches(), 2);

    let inits: Vec<String> = fx
        .device_calls()
        .into_iter()
        .filter(|c| c.starts_with("init"))
        .collect();
    assert_eq!(inits, vec!["init 20".to_string(), "init 20".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn max_length_override_limits_reach() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[(0, &[label(1)])]);

    let started = fx.orchestrator.start(project_id, Some(3)).await.unwrap();
    fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_eq!(started.total_frames, 3);
    assert_eq!(fx.store.masked_frames(project_id), vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn trim_range_bounds_the_plan() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[(0, &[label(1)]), (2, &[label(1)])]);
    let mut project = ProjectRecord::new(project_id, "clip");
    project.trim_start = Some(0.2);
    project.trim_end = Some(0.6);
    project.video_fps = Some(10.0);
    project.video_frame_count = Some(10);
    fx.store.insert_project(project);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    fx.follow(&started.job_id).await;
    fx.settle().await;

    // Bounds are frames 2..=5; frame 0 is outside and seeds nothing.
    assert_eq!(started.total_segments, 1);
    assert_eq!(started.total_frames, 3);
    assert_eq!(fx.store.masked_frames(project_id), vec![3, 4, 5]);
}

// ---------------------------------------------------------------------------
// Test: failures are recorded on the job
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn device_failure_fails_the_job() {
    let (device, calls) = FakeDevice::new();
    let fx = Fixture::with_device(device.failing_after(2), calls);
    let project_id = fx.add_project(6, &[(0, &[label(1)])]);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_monotonic(&snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.status(), JobStatus::Failed);
    assert!(last.error().unwrap().contains("out of device memory"));

    let job = fx.orchestrator.job(&started.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.state.error().is_some());
    assert!(job.state.completed_at().is_none());

    assert!(fx.store.masked_frames(project_id).is_empty());
    assert_eq!(fx.store.stage(project_id), Some(ProjectStage::ManualLabeling));
    assert_eq!(fx.device_calls().last().map(String::as_str), Some("reset"));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_frames_directory_fails_the_job() {
    let fx = Fixture::new();
    let project_id = fx.add_project(6, &[(0, &[label(1)])]);
    std::fs::remove_dir_all(fx.orchestrator.config().frames_dir(project_id)).unwrap();

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    let snapshots = fx.follow(&started.job_id).await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.status(), JobStatus::Failed);
    assert!(last.error().unwrap().contains("Inference directory not found"));
    assert!(fx.device_calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn frames_missing_from_disk_fail_the_job() {
    let fx = Fixture::new();
    let project_id = fx.add_project(10, &[(0, &[label(1)])]);
    let dir = fx.orchestrator.config().frames_dir(project_id);
    for i in 6..10 {
        std::fs::remove_file(dir.join(format!("frame_{i:04}.png"))).unwrap();
    }

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    let last = snapshots.last().unwrap();
    assert_eq!(last.status(), JobStatus::Failed);
    assert!(last.error().unwrap().contains("exceeds the 6 available frames"));

    let job = fx.orchestrator.job(&started.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(fx.store.masked_frames(project_id).is_empty());
    assert_eq!(fx.store.stage(project_id), Some(ProjectStage::ManualLabeling));
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_run_fails_the_job() {
    let fx = Fixture::panicking_on_write();
    let project_id = fx.add_project(6, &[(0, &[label(1)])]);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_monotonic(&snapshots);
    let last = snapshots.last().unwrap();
    assert_eq!(last.status(), JobStatus::Failed);
    assert!(last.error().unwrap().contains("mask table is corrupt"));
    assert_eq!(last.frames_completed(), 5);

    let job = fx.orchestrator.job(&started.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(fx.orchestrator.active_jobs(), 0);
    assert_eq!(fx.store.stage(project_id), Some(ProjectStage::ManualLabeling));
}

#[tokio::test(flavor = "multi_thread")]
async fn store_failure_fails_the_job() {
    let fx = Fixture::new();
    let project_id = fx.add_project(6, &[(0, &[label(1)])]);
    fx.store.fail_writes(true);

    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    let snapshots = fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_eq!(snapshots.last().unwrap().status(), JobStatus::Failed);
    assert_eq!(fx.store.stage(project_id), Some(ProjectStage::ManualLabeling));
}

// ---------------------------------------------------------------------------
// Test: concurrent jobs stay isolated
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_jobs_only_see_their_own_progress() {
    let fx = Fixture::new();
    let first = fx.add_project(12, &[(0, &[label(1)])]);
    let second = fx.add_project(8, &[(0, &[label(2)])]);

    let job_a = fx.orchestrator.start(first, None).await.unwrap();
    let job_b = fx.orchestrator.start(second, None).await.unwrap();
    let (seen_a, seen_b) = tokio::join!(fx.follow(&job_a.job_id), fx.follow(&job_b.job_id));
    fx.settle().await;

    assert!(seen_a
        .iter()
        .all(|s| s.job_id() == job_a.job_id && s.project_id() == first));
    assert!(seen_b
        .iter()
        .all(|s| s.job_id() == job_b.job_id && s.project_id() == second));
    assert_eq!(seen_a.last().unwrap().status(), JobStatus::Completed);
    assert_eq!(seen_b.last().unwrap().status(), JobStatus::Completed);
    assert_eq!(fx.store.masked_frames(first), (1..12).collect::<Vec<_>>());
    assert_eq!(fx.store.masked_frames(second), (1..8).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Test: retention and shutdown
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn finished_jobs_are_evicted_after_retention() {
    let fx = Fixture::new();
    let project_id = fx.add_project(4, &[(0, &[label(1)])]);
    let started = fx.orchestrator.start(project_id, None).await.unwrap();
    fx.follow(&started.job_id).await;
    fx.settle().await;

    assert_eq!(fx.orchestrator.evict_expired(Duration::from_secs(3600)).await, 0);
    assert!(fx.orchestrator.job(&started.job_id).await.is_some());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.orchestrator.evict_expired(Duration::ZERO).await, 1);
    assert!(fx.orchestrator.job(&started.job_id).await.is_none());
    assert!(!fx.orchestrator.broadcaster().is_registered(&started.job_id).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_running_jobs() {
    let fx = Fixture::new();
    let project_id = fx.add_project(6, &[(0, &[label(1)])]);
    let started = fx.orchestrator.start(project_id, None).await.unwrap();

    assert!(fx.orchestrator.shutdown(Duration::from_secs(10)).await);

    let job = fx.orchestrator.job(&started.job_id).await.unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
}
