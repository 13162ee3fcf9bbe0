#![allow(dead_code)]

use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use image::{ImageBuffer, Rgb};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use segflow_api::config::ServerConfig;
use segflow_api::router::build_app_router;
use segflow_api::state::AppState;
use segflow_core::frame::{LabeledFrame, PointPrompt};
use segflow_core::project::ProjectRecord;
use segflow_core::store::MemoryLabelStore;
use segflow_core::types::ProjectId;
use segflow_events::ProgressBroadcaster;
use segflow_inference::device::DeviceFrames;
use segflow_inference::{
    BinaryMask, DeviceError, DeviceFrame, DeviceInfo, InferenceManager, ObjectMask, SegmentationDevice,
};
use segflow_pipeline::PropagationOrchestrator;

pub const FRAME_SIZE: u32 = 8;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config(projects_root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        projects_root_dir: projects_root.to_path_buf(),
        max_propagation_length: 50,
        inference_width: 1024,
        inference_device_urls: Vec::new(),
        job_retention_secs: 3600,
        ws_keepalive_secs: 30,
    }
}

// ---------------------------------------------------------------------------
// Fake segmentation device
// ---------------------------------------------------------------------------

/// Fills the whole frame for every prompted object.
///
/// A gated device blocks in `propagate` until the gate's sender sends or is
/// dropped.
pub struct FakeDevice {
    gate: Option<std_mpsc::Receiver<()>>,
    objects: Vec<u32>,
    num_frames: u32,
    size: (u32, u32),
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            gate: None,
            objects: Vec::new(),
            num_frames: 0,
            size: (0, 0),
        }
    }

    pub fn gated() -> (Self, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        let mut device = Self::new();
        device.gate = Some(rx);
        (device, tx)
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
        Ok(())
    }

    fn add_points(
        &mut self,
        _frame_index: u32,
        object_id: u32,
        _points: &[[f32; 2]],
        _labels: &[i32],
        _clear_old: bool,
    ) -> Result<(), DeviceError> {
        self.objects.push(object_id);
        Ok(())
    }

    fn propagate(&mut self, max_frames: u32) -> Result<DeviceFrames<'_>, DeviceError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        let (w, h) = self.size;
        let objects = self.objects.clone();
        let frames = (0..max_frames.min(self.num_frames)).map(move |frame_index| {
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

    fn reset_state(&mut self) {}
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub store: Arc<MemoryLabelStore>,
    pub state: AppState,
    pub config: ServerConfig,
    pub root: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(FakeDevice::new(), |_| {})
    }

    /// Build the app around `device`, letting `configure` adjust the
    /// config first.
    pub fn build(device: FakeDevice, configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        configure(&mut config);

        let store = Arc::new(MemoryLabelStore::new());
        let inference = Arc::new(
            InferenceManager::new(config.inference_width).with_device(Box::new(device)),
        );
        let orchestrator = Arc::new(PropagationOrchestrator::new(
            store.clone(),
            Arc::clone(&inference),
            Arc::new(ProgressBroadcaster::new()),
            config.pipeline_config(),
        ));

        let state = AppState {
            store: store.clone(),
            config: Arc::new(config.clone()),
            inference,
            orchestrator,
        };

        Self {
            store,
            state,
            config,
            root,
        }
    }

    /// Build the full application router with all middleware layers, the
    /// same stack `main.rs` serves.
    pub fn router(&self) -> Router {
        build_app_router(self.state.clone(), &self.config)
    }

    /// A project of `frame_count` frames on disk, with `labeled` frames
    /// carrying one positive point for a single label.
    pub fn add_project(&self, frame_count: u32, labeled: &[u32]) -> ProjectId {
        let project = ProjectRecord::new(Uuid::new_v4(), "clip");
        let project_id = project.id;
        self.store.insert_project(project);

        let dir = self.state.orchestrator.config().frames_dir(project_id);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..frame_count {
            ImageBuffer::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([90u8, 90, 90]))
                .save(dir.join(format!("frame_{i:04}.png")))
                .unwrap();
        }

        for n in 0..frame_count {
            let mut frame = LabeledFrame::new(n);
            if labeled.contains(&n) {
                frame.manually_labeled = true;
                frame
                    .points_by_label
                    .insert(Uuid::from_u128(1), vec![PointPrompt::include(0.5, 0.5)]);
                frame.points_updated_at = Some(Utc::now());
            }
            self.store.insert_frame(project_id, frame);
        }
        project_id
    }

    /// Wait until no job run is in flight.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.state.orchestrator.active_jobs() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job runs did not settle");
    }

    /// Serve the router on an ephemeral port; returns the bound address.
    pub async fn serve(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a GET request to the given URI and return the response.
pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

/// Send a POST request with a raw body, declared as JSON.
pub async fn post_raw(app: Router, uri: &str, body: impl Into<String>) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Send a POST request without a body.
pub async fn post_empty(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
