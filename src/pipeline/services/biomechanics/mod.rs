pub mod analyzer;
pub mod angles;
pub mod phase;
pub mod similarity;

pub use analyzer::{BiomechanicsAnalyzer, MetricsSummary};
pub use phase::classify_phase;
pub use similarity::{similarity_score, TARGET_PROFILE};
