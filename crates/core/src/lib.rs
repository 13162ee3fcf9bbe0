//! Domain types and pure logic for label propagation.
//!
//! - [`segment::analyze`] decides which frame ranges to propagate and from
//!   which manually labeled source frame.
//! - [`progress`] defines job status and the immutable progress snapshot.
//! - [`store::LabelStore`] is the seam to the external label store.
//! - [`error::CoreError`] is the error taxonomy every other crate maps into.

pub mod error;
pub mod frame;
pub mod mask;
pub mod progress;
pub mod project;
pub mod segment;
pub mod store;
pub mod trim;
pub mod types;
