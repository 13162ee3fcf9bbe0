use segflow_core::error::CoreError;
use segflow_core::types::FrameNumber;

/// Errors reported by a [`SegmentationDevice`](crate::device::SegmentationDevice).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device cannot be reached or refused to initialize.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// The device answered with something that does not follow the protocol.
    #[error("device protocol error: {0}")]
    Protocol(String),

    /// The device accepted the request but failed while executing it.
    #[error("device execution failed: {0}")]
    Failed(String),

    /// A call that needs an initialized state was made without one.
    #[error("inference state not initialized")]
    NotInitialized,
}

/// Errors from preparing, driving or releasing an inference session.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// No segmentation device is configured or the named one is unknown.
    #[error("no segmentation device available: {0}")]
    NoDevice(String),

    /// The requested window does not fit the frames on disk.
    #[error("frame window {start}+{length} exceeds the {available} available frames")]
    Window {
        start: FrameNumber,
        length: u32,
        available: usize,
    },

    /// A frame outside the session window was addressed.
    #[error("frame {frame} is outside the session window {start}..={end}")]
    OutsideWindow {
        frame: FrameNumber,
        start: FrameNumber,
        end: FrameNumber,
    },

    #[error("frame source error: {0}")]
    Frames(String),

    /// The device yielded frames out of ascending order.
    #[error("device yielded frame {got} after {previous}")]
    OutOfOrder { previous: u32, got: u32 },

    /// `propagate` was already called on this session.
    #[error("session already propagated")]
    AlreadyPropagated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The blocking worker running the session panicked or was cancelled.
    #[error("inference worker failed: {0}")]
    Worker(String),
}

impl From<InferenceError> for CoreError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::Device(DeviceError::Unavailable(_)) | InferenceError::NoDevice(_) => {
                CoreError::ResourceUnavailable(err.to_string())
            }
            InferenceError::Window { .. } | InferenceError::OutsideWindow { .. } => {
                CoreError::InvalidState(err.to_string())
            }
            other => CoreError::ExecutionFailure(other.to_string()),
        }
    }
}
