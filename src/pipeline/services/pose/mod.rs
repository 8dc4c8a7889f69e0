mod provider;

pub use provider::{synthesize_pose, PoseProvider, SYNTHETIC_VISIBILITY};
