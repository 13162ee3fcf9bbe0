/// Projects are identified by UUID.
pub type ProjectId = uuid::Uuid;

/// Labels (object classes) are identified by UUID.
pub type LabelId = uuid::Uuid;

/// Zero-based frame index within a project's extracted frame sequence.
pub type FrameNumber = u32;

/// Opaque propagation job identifier (UUID v4 string).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
