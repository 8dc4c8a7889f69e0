pub mod clustering;
pub mod pixel_classifier;
pub mod region_estimator;
pub mod scratch_buffer;

pub use clustering::{Cluster, ScoredPoint, SpatialClusterer};
pub use pixel_classifier::{classify, PixelClass, PixelFeatures, PixelMatch};
pub use region_estimator::RegionEstimator;
pub use scratch_buffer::ScratchBuffer;
