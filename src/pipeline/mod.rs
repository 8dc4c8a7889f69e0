pub mod context;
pub mod orchestration;
pub mod services;
pub mod types;

pub use context::{FrameAnalysis, FrameTimings, StatusReport};
pub use orchestration::{AnalysisSession, AnalysisSessionBuilder};
