pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod sink;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, DetectionError, InferenceError};
pub use pipeline::orchestration::{AnalysisSession, AnalysisSessionBuilder};
pub use sink::{JsonFileSink, PersistenceSink, SessionSnapshot};
