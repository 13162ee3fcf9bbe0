//! Segmentation device access for label propagation.
//!
//! - [`InferenceManager`] owns the configured devices, one exclusive lock
//!   each, and opens [`InferenceSession`]s over frame windows.
//! - [`SegmentationDevice`] is the blocking device contract;
//!   [`RemoteDevice`] implements it over HTTP.
//! - [`contour::largest_contour`] turns a propagated mask into the polygon
//!   stored in the label store.

pub mod contour;
pub mod device;
pub mod error;
pub mod frames;
pub mod manager;
pub mod mask;
pub mod remote;
pub mod session;

pub use device::{DeviceFrame, DeviceInfo, ObjectMask, SegmentationDevice};
pub use error::{DeviceError, InferenceError};
pub use manager::{DeviceStatus, InferenceManager, DEFAULT_INFERENCE_WIDTH};
pub use mask::BinaryMask;
pub use remote::RemoteDevice;
pub use session::{InferenceSession, PropagatedFrame};
