//! Multi-device inference session manager.
//!
//! [`InferenceManager`] owns every configured [`SegmentationDevice`] behind
//! its own exclusive lock. Opening a session takes that lock and keeps it
//! until the session is released, so `prepare`, prompting, propagation and
//! release on one device form a single atomic unit across the process.
//! Propagation always uses the primary (first) device.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use segflow_core::types::FrameNumber;

use crate::device::{DeviceInfo, SegmentationDevice};
use crate::error::InferenceError;
use crate::frames::{discover_frames, prepare_window};
use crate::session::InferenceSession;

/// Default working width for frames handed to a device.
pub const DEFAULT_INFERENCE_WIDTH: u32 = 1024;

struct ManagedDevice {
    info: DeviceInfo,
    slot: Arc<Mutex<Box<dyn SegmentationDevice>>>,
}

/// Point-in-time view of one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    #[serde(flatten)]
    pub info: DeviceInfo,
    /// Whether a session currently holds the device.
    pub busy: bool,
    pub primary: bool,
}

/// Hands out exclusive inference sessions.
///
/// Created once at startup; share it via `Arc<InferenceManager>`.
pub struct InferenceManager {
    devices: Vec<ManagedDevice>,
    inference_width: u32,
}

impl InferenceManager {
    pub fn new(inference_width: u32) -> Self {
        Self {
            devices: Vec::new(),
            inference_width,
        }
    }

    /// Register a device. The first one registered is the primary.
    pub fn with_device(mut self, device: Box<dyn SegmentationDevice>) -> Self {
        let info = device.info();
        tracing::info!(
            device_id = %info.device_id,
            endpoint = %info.endpoint,
            primary = self.devices.is_empty(),
            "Registered segmentation device",
        );
        self.devices.push(ManagedDevice {
            info,
            slot: Arc::new(Mutex::new(device)),
        });
        self
    }

    pub fn inference_width(&self) -> u32 {
        self.inference_width
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Open a session over `length` frames of `frames_dir` starting at
    /// `start_frame`, on the primary device.
    ///
    /// Waits for any session already holding the device to be released.
    pub async fn prepare(
        &self,
        frames_dir: &Path,
        start_frame: FrameNumber,
        length: u32,
    ) -> Result<InferenceSession, InferenceError> {
        let primary = self
            .devices
            .first()
            .ok_or_else(|| InferenceError::NoDevice("none configured".into()))?;
        self.prepare_with(primary, frames_dir, start_frame, length).await
    }

    /// Like [`prepare`](Self::prepare) on a specific device.
    pub async fn prepare_on(
        &self,
        device_id: &str,
        frames_dir: &Path,
        start_frame: FrameNumber,
        length: u32,
    ) -> Result<InferenceSession, InferenceError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.info.device_id == device_id)
            .ok_or_else(|| InferenceError::NoDevice(device_id.to_string()))?;
        self.prepare_with(device, frames_dir, start_frame, length).await
    }

    /// Status of every device, primary first.
    pub fn status(&self) -> Vec<DeviceStatus> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, d)| DeviceStatus {
                info: d.info.clone(),
                busy: d.slot.try_lock().is_err(),
                primary: i == 0,
            })
            .collect()
    }

    async fn prepare_with(
        &self,
        device: &ManagedDevice,
        frames_dir: &Path,
        start_frame: FrameNumber,
        length: u32,
    ) -> Result<InferenceSession, InferenceError> {
        let guard = Arc::clone(&device.slot).lock_owned().await;
        tracing::debug!(
            device_id = %device.info.device_id,
            start_frame,
            length,
            "Acquired segmentation device",
        );

        let frames_dir: PathBuf = frames_dir.to_path_buf();
        let width = self.inference_width;
        tokio::task::spawn_blocking(move || {
            let frames = discover_frames(&frames_dir)?;
            let window = prepare_window(&frames, start_frame, length, width)?;
            InferenceSession::open(guard, window)
        })
        .await
        .map_err(|e| InferenceError::Worker(e.to_string()))?
    }
}
