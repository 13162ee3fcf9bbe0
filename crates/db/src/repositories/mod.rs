//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod frame_repo;
pub mod mask_repo;
pub mod project_repo;

pub use frame_repo::FrameRepo;
pub use mask_repo::MaskRepo;
pub use project_repo::ProjectRepo;
