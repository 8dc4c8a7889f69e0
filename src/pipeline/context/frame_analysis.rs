use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use super::status::StatusReport;
use crate::pipeline::types::{
    BiomechanicsReport, BodyRegion, ImplementDetection, Pose, ProjectileDetection,
};

/// Wall time spent in each stage for one frame, in pipeline order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameTimings {
    stages: IndexMap<&'static str, Duration>,
}

impl FrameTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record time for a stage; repeated entries accumulate.
    pub fn record(&mut self, stage: &'static str, duration: Duration) {
        *self.stages.entry(stage).or_insert(Duration::ZERO) += duration;
    }

    pub fn get(&self, stage: &str) -> Option<Duration> {
        self.stages.get(stage).copied()
    }

    pub fn stages(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.stages.iter().map(|(name, duration)| (*name, *duration))
    }

    pub fn total(&self) -> Duration {
        self.stages.values().sum()
    }
}

/// Everything the pipeline produced for one frame. Shared read-only with the overlay.
#[derive(Debug, Clone, Serialize)]
pub struct FrameAnalysis {
    pub frame_id: Uuid,
    pub timestamp: Duration,
    pub region: Option<BodyRegion>,
    pub pose: Option<Pose>,
    pub implement: Option<ImplementDetection>,
    pub projectile: Option<ProjectileDetection>,
    pub biomechanics: Option<BiomechanicsReport>,
    pub timings: FrameTimings,
    pub status: StatusReport,
}
