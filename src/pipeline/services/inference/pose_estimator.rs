use crate::common::Frame;
use crate::error::InferenceError;
use crate::pipeline::types::Pose;

/// External pose inference. Implementations return 33 landmarks in frame-normalized coordinates.
pub trait PoseEstimator: Send {
    /// `Ok(None)` when no person is visible.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>, InferenceError>;

    /// False while the backing model is still loading or has failed.
    fn is_ready(&self) -> bool {
        true
    }
}
