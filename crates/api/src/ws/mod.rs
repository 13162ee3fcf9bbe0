//! WebSocket progress streams.

pub mod progress;

pub use progress::progress_ws;
