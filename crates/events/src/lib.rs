//! Progress fan-out for propagation jobs.
//!
//! - [`ProgressBroadcaster`] keeps per-job listener sets and replays the
//!   latest snapshot to late subscribers.

pub mod broadcaster;

pub use broadcaster::{ListenerId, ProgressBroadcaster, SnapshotSender};
