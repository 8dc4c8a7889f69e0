pub mod biomechanics;
pub mod detection;
pub mod image;
pub mod inference;
pub mod pose;

pub use biomechanics::BiomechanicsAnalyzer;
pub use detection::{ImplementDetector, ProjectileDetector};
pub use image::RegionEstimator;
pub use pose::PoseProvider;
