#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{ImageBuffer, Rgb};
use segflow_inference::device::DeviceFrames;
use segflow_inference::{BinaryMask, DeviceError, DeviceFrame, DeviceInfo, ObjectMask, SegmentationDevice};

/// Shared log of device calls, readable after the device moved into a manager.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// In-process device that fills every prompted object's mask completely.
pub struct FakeDevice {
    id: String,
    calls: CallLog,
    mask_size: (u32, u32),
    fail_ready: bool,
    order: Option<Vec<u32>>,
    objects: Vec<u32>,
    num_frames: u32,
}

impl FakeDevice {
    pub fn new(id: &str, mask_size: (u32, u32)) -> (Self, CallLog) {
        let calls = CallLog::default();
        let device = Self {
            id: id.to_string(),
            calls: Arc::clone(&calls),
            mask_size,
            fail_ready: false,
            order: None,
            objects: Vec::new(),
            num_frames: 0,
        };
        (device, calls)
    }

    pub fn failing_ready(mut self) -> Self {
        self.fail_ready = true;
        self
    }

    /// Yield these window indices instead of `0..num_frames`.
    pub fn with_order(mut self, order: Vec<u32>) -> Self {
        self.order = Some(order);
        self
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl SegmentationDevice for FakeDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.id.clone(),
            endpoint: format!("fake://{}", self.id),
        }
    }

    fn ensure_ready(&mut self) -> Result<(), DeviceError> {
        self.log("ready");
        if self.fail_ready {
            return Err(DeviceError::Unavailable("model not loaded".into()));
        }
        Ok(())
    }

    fn init_state(&mut self, frames_dir: &Path, num_frames: u32) -> Result<(), DeviceError> {
        let on_disk = std::fs::read_dir(frames_dir)
            .map(|d| d.count() as u32)
            .unwrap_or(0);
        self.log(format!("init {num_frames} {on_disk}"));
        self.num_frames = num_frames;
        self.objects.clear();
        Ok(())
    }

    fn add_points(
        &mut self,
        frame_index: u32,
        object_id: u32,
        points: &[[f32; 2]],
        labels: &[i32],
        clear_old: bool,
    ) -> Result<(), DeviceError> {
        self.log(format!(
            "points {frame_index} {object_id} {} {labels:?} {clear_old}",
            points.len()
        ));
        if !self.objects.contains(&object_id) {
            self.objects.push(object_id);
        }
        Ok(())
    }

    fn propagate(&mut self, max_frames: u32) -> Result<DeviceFrames<'_>, DeviceError> {
        self.log(format!("propagate {max_frames}"));
        let indices = self
            .order
            .clone()
            .unwrap_or_else(|| (0..max_frames.min(self.num_frames)).collect());
        let (w, h) = self.mask_size;
        let objects = self.objects.clone();
        Ok(Box::new(indices.into_iter().map(move |frame_index| {
            let masks = objects
                .iter()
                .map(|&object_id| {
                    Ok(ObjectMask {
                        object_id,
                        mask: BinaryMask::from_bits(w, h, vec![true; (w * h) as usize])
                            .ok_or_else(|| DeviceError::Failed("bad mask size".into()))?,
                    })
                })
                .collect::<Result<Vec<_>, DeviceError>>()?;
            Ok(DeviceFrame { frame_index, masks })
        })))
    }

    fn reset_state(&mut self) {
        self.log("reset");
        self.objects.clear();
    }
}

/// Write `count` solid PNG frames named `frame_0.png ..` into `dir`.
pub fn write_frames(dir: &Path, count: u32, width: u32, height: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("frame_{i}.png"));
            ImageBuffer::from_pixel(width, height, Rgb([40u8, 80, 120]))
                .save(&path)
                .unwrap();
            path
        })
        .collect()
}

pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
