//! One exclusive use of a segmentation device over a frame window.

use tokio::sync::OwnedMutexGuard;

use segflow_core::frame::PointPrompt;
use segflow_core::types::FrameNumber;

use crate::device::{DeviceFrames, ObjectMask, SegmentationDevice};
use crate::error::InferenceError;
use crate::frames::PreparedWindow;

/// Exclusive device handle shared through the manager's per-device lock.
pub type DeviceGuard = OwnedMutexGuard<Box<dyn SegmentationDevice>>;

/// A live inference session.
///
/// Holds the device lock for its whole lifetime, so no other session can
/// start on the same device until this one is released or dropped. All
/// methods block and must run off the async runtime.
pub struct InferenceSession {
    device: DeviceGuard,
    window: PreparedWindow,
    propagated: bool,
}

/// Results for one window frame, at original resolution.
#[derive(Debug, Clone)]
pub struct PropagatedFrame {
    pub local_index: u32,
    pub frame_number: FrameNumber,
    /// Share of the window processed once this frame is done, in `(0, 1]`.
    pub progress: f64,
    pub masks: Vec<ObjectMask>,
}

impl InferenceSession {
    /// Initialise device state over a prepared window.
    pub(crate) fn open(mut device: DeviceGuard, window: PreparedWindow) -> Result<Self, InferenceError> {
        let init = device
            .ensure_ready()
            .and_then(|()| device.init_state(window.path(), window.len()));
        if let Err(err) = init {
            device.reset_state();
            return Err(err.into());
        }

        tracing::debug!(
            device_id = %device.info().device_id,
            start_frame = window.start_frame(),
            frames = window.len(),
            "Inference session opened",
        );
        Ok(Self {
            device,
            window,
            propagated: false,
        })
    }

    pub fn start_frame(&self) -> FrameNumber {
        self.window.start_frame()
    }

    /// Last frame of the window (inclusive).
    pub fn end_frame(&self) -> FrameNumber {
        self.window.start_frame() + self.window.len() - 1
    }

    pub fn len(&self) -> u32 {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Register prompts for `object_id` on window frame `local_index`.
    ///
    /// With `overwrite`, earlier prompts for the object are discarded. An
    /// empty prompt list is a no-op.
    pub fn add_prompt(
        &mut self,
        local_index: u32,
        object_id: u32,
        prompts: &[PointPrompt],
        overwrite: bool,
    ) -> Result<(), InferenceError> {
        if local_index >= self.window.len() {
            return Err(InferenceError::OutsideWindow {
                frame: self.window.start_frame() + local_index,
                start: self.start_frame(),
                end: self.end_frame(),
            });
        }
        if prompts.is_empty() {
            return Ok(());
        }

        let points: Vec<[f32; 2]> = prompts.iter().map(|p| [p.x, p.y]).collect();
        let labels: Vec<i32> = prompts.iter().map(|p| i32::from(p.include)).collect();
        self.device
            .add_points(local_index, object_id, &points, &labels, overwrite)?;
        Ok(())
    }

    /// Propagate across the whole window.
    ///
    /// The returned sequence is lazy, ascending and finite, and can be
    /// consumed once per session.
    pub fn propagate(&mut self) -> Result<Propagation<'_>, InferenceError> {
        if self.propagated {
            return Err(InferenceError::AlreadyPropagated);
        }
        self.propagated = true;

        let len = self.window.len();
        let start_frame = self.window.start_frame();
        let original = self.window.original_dimensions();
        let scaled = self.window.is_scaled();
        let frames = self.device.propagate(len)?;

        Ok(Propagation {
            frames,
            start_frame,
            len,
            original,
            scaled,
            last: None,
            done: false,
        })
    }

    /// Free the window and device-side state.
    pub fn release(self) {
        drop(self);
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("device", &self.device.info().device_id)
            .field("window", &self.window)
            .field("propagated", &self.propagated)
            .finish()
    }
}

impl Drop for InferenceSession {
    fn drop(&mut self) {
        self.device.reset_state();
        tracing::debug!(
            device_id = %self.device.info().device_id,
            start_frame = self.window.start_frame(),
            "Inference session released",
        );
    }
}

/// Iterator over propagation results, upscaled to original resolution.
pub struct Propagation<'a> {
    frames: DeviceFrames<'a>,
    start_frame: FrameNumber,
    len: u32,
    original: (u32, u32),
    scaled: bool,
    last: Option<u32>,
    done: bool,
}

impl Iterator for Propagation<'_> {
    type Item = Result<PropagatedFrame, InferenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = match self.frames.next()? {
            Ok(frame) => frame,
            Err(err) => {
                self.done = true;
                return Some(Err(err.into()));
            }
        };

        if frame.frame_index >= self.len {
            self.done = true;
            return Some(Err(InferenceError::OutsideWindow {
                frame: self.start_frame + frame.frame_index,
                start: self.start_frame,
                end: self.start_frame + self.len - 1,
            }));
        }
        if let Some(previous) = self.last.filter(|&p| frame.frame_index <= p) {
            self.done = true;
            return Some(Err(InferenceError::OutOfOrder {
                previous,
                got: frame.frame_index,
            }));
        }
        self.last = Some(frame.frame_index);

        let (width, height) = self.original;
        let masks = frame
            .masks
            .into_iter()
            .map(|m| ObjectMask {
                object_id: m.object_id,
                mask: if self.scaled || (m.mask.width(), m.mask.height()) != self.original {
                    m.mask.upscale_nearest(width, height)
                } else {
                    m.mask
                },
            })
            .collect();

        Some(Ok(PropagatedFrame {
            local_index: frame.frame_index,
            frame_number: self.start_frame + frame.frame_index,
            progress: f64::from(frame.frame_index + 1) / f64::from(self.len),
            masks,
        }))
    }
}
