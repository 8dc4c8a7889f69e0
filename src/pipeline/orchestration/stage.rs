use crate::common::Frame;
use crate::error::DetectionError;
use crate::pipeline::types::{BodyRegion, Pose};

/// Everything a stage may read for one frame: the frame itself plus the most
/// recent outputs of the stages it depends on.
#[derive(Clone, Copy)]
pub struct StageInput<'a> {
    pub frame: &'a Frame,
    pub region: Option<&'a BodyRegion>,
    pub pose: Option<&'a Pose>,
}

impl<'a> StageInput<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self {
            frame,
            region: None,
            pose: None,
        }
    }

    pub fn with_region(mut self, region: Option<&'a BodyRegion>) -> Self {
        self.region = region;
        self
    }

    pub fn with_pose(mut self, pose: Option<&'a Pose>) -> Self {
        self.pose = pose;
        self
    }
}

/// One independently callable step of the per-frame pipeline.
pub trait FrameStage: Send {
    type Output: Clone + Send + Sync;

    /// `Ok(None)` means nothing was found this frame.
    fn process(&mut self, input: &StageInput<'_>) -> Result<Option<Self::Output>, DetectionError>;

    fn name(&self) -> &'static str;

    /// Drop any history held across frames.
    fn reset(&mut self) {}
}
