pub mod frame_analysis;
pub mod status;

pub use frame_analysis::{FrameAnalysis, FrameTimings};
pub use status::{StatusReport, TrackedEntity, TrackingStatus};
