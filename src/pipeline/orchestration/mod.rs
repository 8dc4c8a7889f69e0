pub mod session;
pub mod stage;
pub mod throttled_stage;
pub mod tier_chain;

pub use session::{AnalysisSession, AnalysisSessionBuilder};
pub use stage::{FrameStage, StageInput};
pub use throttled_stage::{StageRun, Throttle, ThrottledStage};
pub use tier_chain::{DetectionStrategy, TierChain, TierContext, TierOutcome};
