pub mod clock;
pub mod frame;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use frame::{Frame, FrameSource, SourceState};
