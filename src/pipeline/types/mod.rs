mod detection;
mod history;
mod landmark;
mod serve;

pub use detection::{
    BodyRegion, DetectionBox, DetectionTier, ImplementDetection, KeypointKind,
    ProjectileDetection, RegionKeypoint, TrailPoint,
};
pub use history::{DetectionHistory, MotionTrail};
pub use landmark::{
    BodySide, Handedness, Landmark, LandmarkIndex, Pose, PoseSource, LANDMARK_COUNT,
};
pub use serve::{
    BiomechanicsReport, CameraAngle, ServeMetrics, ServePhase, CONTACT_HEIGHT_RANGE,
    ELBOW_ANGLE_RANGE, FOLLOW_THROUGH_RANGE, KNEE_ANGLE_RANGE, X_FACTOR_RANGE,
};
