use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::stage::{FrameStage, StageInput};

/// Minimum-interval gate compared against a monotonic timestamp.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_run: Option<Duration>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: None,
        }
    }

    /// True (and records `now`) when enough time has passed since the last run.
    pub fn try_acquire(&mut self, now: Duration) -> bool {
        let due = match self.last_run {
            None => true,
            // A clock that went backwards (new source) counts as due.
            Some(last) => now < last || now - last >= self.min_interval,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_run = None;
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

/// Outcome of polling a throttled stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRun {
    /// The stage ran this tick.
    Ran,
    /// Skipped by the throttle; the previous output is reported.
    Throttled,
    /// The stage errored; treated as "nothing this frame".
    Failed,
}

/// Wraps a stage with a throttle and remembers its latest output so
/// downstream stages never wait on a fresh result.
pub struct ThrottledStage<S: FrameStage> {
    inner: S,
    throttle: Throttle,
    latest: Option<S::Output>,
    last_duration: Duration,
}

impl<S: FrameStage> ThrottledStage<S> {
    pub fn new(stage: S, min_interval: Duration) -> Self {
        Self {
            inner: stage,
            throttle: Throttle::new(min_interval),
            latest: None,
            last_duration: Duration::ZERO,
        }
    }

    /// Run the stage if its interval has elapsed. Errors never escape.
    pub fn poll(&mut self, input: &StageInput<'_>, now: Duration) -> StageRun {
        if !self.throttle.try_acquire(now) {
            return StageRun::Throttled;
        }

        let start = Instant::now();
        let result = self.inner.process(input);
        self.last_duration = start.elapsed();

        match result {
            Ok(output) => {
                debug!(
                    "{} ran in {}us, output={}",
                    self.inner.name(),
                    self.last_duration.as_micros(),
                    output.is_some()
                );
                self.latest = output;
                StageRun::Ran
            }
            Err(e) => {
                warn!("{} failed, treating as no detection: {}", self.inner.name(), e);
                self.latest = None;
                StageRun::Failed
            }
        }
    }

    pub fn latest(&self) -> Option<&S::Output> {
        self.latest.as_ref()
    }

    pub fn last_duration(&self) -> Duration {
        self.last_duration
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.throttle.reset();
        self.latest = None;
    }
}
