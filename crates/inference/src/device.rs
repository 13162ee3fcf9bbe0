//! The segmentation capability consumed by inference sessions.
//!
//! A [`SegmentationDevice`] wraps one physical compute resource. Its methods
//! block, so sessions drive it from `spawn_blocking` threads and never from
//! the async runtime directly.

use std::path::Path;

use serde::Serialize;

use crate::error::DeviceError;
use crate::mask::BinaryMask;

/// A mask for one tracked object at the device's working resolution.
#[derive(Debug, Clone)]
pub struct ObjectMask {
    pub object_id: u32,
    pub mask: BinaryMask,
}

/// Masks for every tracked object on one frame of the working window.
#[derive(Debug, Clone)]
pub struct DeviceFrame {
    /// 0-based index within the window.
    pub frame_index: u32,
    pub masks: Vec<ObjectMask>,
}

/// Lazily produced propagation results.
pub type DeviceFrames<'a> = Box<dyn Iterator<Item = Result<DeviceFrame, DeviceError>> + 'a>;

/// Static description of a device, reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    /// Where the device lives, e.g. a base URL.
    pub endpoint: String,
}

/// One physical segmentation resource.
///
/// Implementations hold at most one inference state at a time. Callers
/// guarantee exclusive access for the duration of a session.
pub trait SegmentationDevice: Send {
    fn info(&self) -> DeviceInfo;

    /// Make sure the model is loaded and the device reachable.
    fn ensure_ready(&mut self) -> Result<(), DeviceError>;

    /// Start a fresh inference state over `num_frames` sequentially named
    /// JPEG frames in `frames_dir`.
    fn init_state(&mut self, frames_dir: &Path, num_frames: u32) -> Result<(), DeviceError>;

    /// Register prompts for `object_id` on window frame `frame_index`.
    ///
    /// `points` are normalized `[x, y]` pairs; `labels` holds `1` for
    /// positive and `0` for negative points. With `clear_old` any earlier
    /// prompts for the object are dropped first.
    fn add_points(
        &mut self,
        frame_index: u32,
        object_id: u32,
        points: &[[f32; 2]],
        labels: &[i32],
        clear_old: bool,
    ) -> Result<(), DeviceError>;

    /// Propagate prompts forward from window frame 0 over at most
    /// `max_frames` frames, yielding results in ascending frame order.
    fn propagate(&mut self, max_frames: u32) -> Result<DeviceFrames<'_>, DeviceError>;

    /// Drop the inference state and free device memory. Never fails;
    /// problems are logged.
    fn reset_state(&mut self);
}
