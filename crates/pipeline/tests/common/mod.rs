#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageBuffer, Rgb};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use segflow_core::error::CoreError;
use segflow_core::frame::{LabeledFrame, PointPrompt};
use segflow_core::mask::MaskWrite;
use segflow_core::progress::ProgressSnapshot;
use segflow_core::project::{ProjectRecord, ProjectStage};
use segflow_core::store::{LabelStore, MemoryLabelStore};
use segflow_core::types::{LabelId, ProjectId};
use segflow_events::ProgressBroadcaster;
use segflow_inference::device::DeviceFrames;
use segflow_inference::{
    BinaryMask, DeviceError, DeviceFrame, DeviceInfo, InferenceManager, ObjectMask, SegmentationDevice,
};
use segflow_pipeline::{PipelineConfig, PropagationOrchestrator};

pub const FRAME_SIZE: u32 = 8;

pub type CallLog = Arc<Mutex<Vec<String>>>;

// ---------------------------------------------------------------------------
// Fake segmentation device
// ---------------------------------------------------------------------------

/// Fills the whole frame for every prompted object.
pub struct FakeDevice {
    calls: CallLog,
    fail_after: Option<u32>,
    objects: Vec<u32>,
    num_frames: u32,
    size: (u32, u32),
}

impl FakeDevice {
    pub fn new() -> (Self, CallLog) {
        let calls = CallLog::default();
        let device = Self {
            calls: Arc::clone(&calls),
            fail_after: None,
            objects: Vec::new(),
            num_frames: 0,
            size: (0, 0),
        };
        (device, calls)
    }

    /// Yield `frames` results, then fail.
    pub fn failing_after(mut self, frames: u32) -> Self {
        self.fail_after = Some(frames);
        self
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SegmentationDevice for FakeDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: "fake-0".into(),
            endpoint: "fake://0".into(),
        }
    }

    fn ensure_ready(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn init_state(&mut self, frames_dir: &Path, num_frames: u32) -> Result<(), DeviceError> {
        self.size = image::image_dimensions(frames_dir.join("000000.jpg"))
            .map_err(|e| DeviceError::Failed(e.to_string()))?;
        self.num_frames = num_frames;
        self.objects.clear();
        self.log(format!("init {num_frames}"));
        Ok(())
    }

    fn add_points(
        &mut self,
        frame_index: u32,
        object_id: u32,
        points: &[[f32; 2]],
        _labels: &[i32],
        clear_old: bool,
    ) -> Result<(), DeviceError> {
        self.log(format!("points {frame_index} {object_id} {} {clear_old}", points.len()));
        self.objects.push(object_id);
        Ok(())
    }

    fn propagate(&mut self, max_frames: u32) -> Result<DeviceFrames<'_>, DeviceError> {
        self.log(format!("propagate {max_frames}"));
        let (w, h) = self.size;
        let objects = self.objects.clone();
        let fail_after = self.fail_after;
        let frames = (0..max_frames.min(self.num_frames)).map(move |frame_index| {
            if fail_after.is_some_and(|n| frame_index >= n) {
                return Err(DeviceError::Failed("out of device memory".into()));
            }
            let masks = objects
                .iter()
                .map(|&object_id| ObjectMask {
                    object_id,
                    mask: BinaryMask::from_bits(w, h, vec![true; (w * h) as usize])
                        .unwrap_or_else(|| BinaryMask::empty(w, h)),
                })
                .collect();
            Ok(DeviceFrame { frame_index, masks })
        });
        Ok(Box::new(frames))
    }

    fn reset_state(&mut self) {
        self.log("reset".into());
    }
}

// ---------------------------------------------------------------------------
// Store that panics on write
// ---------------------------------------------------------------------------

pub struct PanickingStore(Arc<MemoryLabelStore>);

#[async_trait]
impl LabelStore for PanickingStore {
    async fn ping(&self) -> Result<(), CoreError> {
        self.0.ping().await
    }

    async fn find_project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>, CoreError> {
        self.0.find_project(project_id).await
    }

    async fn list_frames(&self, project_id: ProjectId) -> Result<Vec<LabeledFrame>, CoreError> {
        self.0.list_frames(project_id).await
    }

    async fn upsert_masks(&self, _project_id: ProjectId, _masks: &[MaskWrite]) -> Result<usize, CoreError> {
        panic!("mask table is corrupt");
    }

    async fn advance_stage(&self, project_id: ProjectId, stage: ProjectStage) -> Result<(), CoreError> {
        self.0.advance_stage(project_id, stage).await
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub store: Arc<MemoryLabelStore>,
    pub orchestrator: Arc<PropagationOrchestrator>,
    pub device_calls: CallLog,
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let (device, calls) = FakeDevice::new();
        Self::with_device(device, calls)
    }

    pub fn with_device(device: FakeDevice, device_calls: CallLog) -> Self {
        Self::build(device, device_calls, |store| store)
    }

    /// A fixture whose store panics inside every mask write.
    pub fn panicking_on_write() -> Self {
        let (device, calls) = FakeDevice::new();
        Self::build(device, calls, |store| Arc::new(PanickingStore(store)))
    }

    fn build(
        device: FakeDevice,
        device_calls: CallLog,
        wrap: impl FnOnce(Arc<MemoryLabelStore>) -> Arc<dyn LabelStore>,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryLabelStore::new());
        let inference = Arc::new(InferenceManager::new(1024).with_device(Box::new(device)));
        let config = PipelineConfig {
            projects_root: root.path().to_path_buf(),
            max_propagation_length: 50,
        };
        let orchestrator = Arc::new(PropagationOrchestrator::new(
            wrap(store.clone()),
            inference,
            Arc::new(ProgressBroadcaster::new()),
            config,
        ));
        Self {
            store,
            orchestrator,
            device_calls,
            root,
        }
    }

    /// A project of `frame_count` frames, with frames on disk and the
    /// given frames manually labeled with one point per label.
    pub fn add_project(&self, frame_count: u32, labeled: &[(u32, &[LabelId])]) -> ProjectId {
        let project = ProjectRecord::new(Uuid::new_v4(), "clip");
        let project_id = project.id;
        self.store.insert_project(project);
        self.write_frames(project_id, frame_count);

        for n in 0..frame_count {
            let mut frame = LabeledFrame::new(n);
            if let Some((_, labels)) = labeled.iter().find(|(f, _)| *f == n) {
                frame.manually_labeled = true;
                frame.points_by_label = labels
                    .iter()
                    .map(|label| (*label, vec![PointPrompt::include(0.5, 0.5)]))
                    .collect();
                frame.points_updated_at = Some(Utc::now());
            }
            self.store.insert_frame(project_id, frame);
        }
        project_id
    }

    pub fn write_frames(&self, project_id: ProjectId, count: u32) {
        let dir = self.orchestrator.config().frames_dir(project_id);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            ImageBuffer::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([90u8, 90, 90]))
                .save(dir.join(format!("frame_{i:04}.png")))
                .unwrap();
        }
    }

    pub fn device_calls(&self) -> Vec<String> {
        self.device_calls.lock().unwrap().clone()
    }

    /// Snapshots of `job_id` from now until its terminal snapshot.
    pub async fn follow(&self, job_id: &str) -> Vec<ProgressSnapshot> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.orchestrator
            .broadcaster()
            .subscribe(job_id, tx)
            .await
            .expect("job is registered");

        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(snapshot) = rx.recv().await {
                let done = snapshot.is_terminal();
                seen.push(snapshot);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("job did not finish in time");
        seen
    }
}

pub fn label(n: u128) -> LabelId {
    Uuid::from_u128(n)
}

impl Fixture {
    /// Wait until no job run is in flight.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.orchestrator.active_jobs() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job runs did not settle");
    }
}

/// `frames_completed` and `progress_percent` never go backwards.
pub fn assert_monotonic(snapshots: &[ProgressSnapshot]) {
    for pair in snapshots.windows(2) {
        assert!(pair[1].frames_completed() >= pair[0].frames_completed());
        assert!(pair[1].progress_percent() >= pair[0].progress_percent());
    }
    for snapshot in snapshots {
        assert!(snapshot.frames_completed() <= snapshot.total_frames());
    }
}
