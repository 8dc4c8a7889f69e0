use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures::future::{ready, Ready};
use tower::Service;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::stage::{FrameStage, StageInput};
use super::throttled_stage::{StageRun, ThrottledStage};
use crate::common::{Clock, Frame, MonotonicClock};
use crate::config::Configuration;
use crate::error::AppError;
use crate::pipeline::context::{FrameAnalysis, FrameTimings, TrackingStatus};
use crate::pipeline::services::biomechanics::{BiomechanicsAnalyzer, MetricsSummary};
use crate::pipeline::services::detection::{ImplementDetector, InferenceTier, ProjectileDetector};
use crate::pipeline::services::image::RegionEstimator;
use crate::pipeline::services::inference::{ModelHandle, PoseEstimator};
use crate::pipeline::services::pose::PoseProvider;
use crate::pipeline::types::{CameraAngle, ServeMetrics, ServePhase};
use crate::sink::SessionSnapshot;

/// Owns every stage of the per-frame pipeline and runs them in order.
///
/// Region feeds pose; pose feeds the implement detector; all three plus the
/// projectile feed biomechanics. Each stage is throttled on its own and later
/// stages read whatever their dependencies produced most recently.
pub struct AnalysisSession {
    id: Uuid,
    camera_angle: CameraAngle,
    region: ThrottledStage<RegionEstimator>,
    pose: ThrottledStage<PoseProvider>,
    implement: ThrottledStage<ImplementDetector>,
    projectile: ThrottledStage<ProjectileDetector>,
    analyzer: BiomechanicsAnalyzer,
    status: TrackingStatus,
    clock: Arc<dyn Clock>,
    model: Option<ModelHandle>,
    first_timestamp: Option<Duration>,
    last_timestamp: Option<Duration>,
    frames_processed: u64,
}

impl AnalysisSession {
    pub fn builder(configuration: Configuration) -> AnalysisSessionBuilder {
        AnalysisSessionBuilder::new(configuration)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run every due stage on `frame`. `None` when the frame cannot be analysed.
    #[instrument(skip_all, fields(frame = %frame.id()))]
    pub fn process(&mut self, frame: &Frame) -> Option<Arc<FrameAnalysis>> {
        if !frame.is_valid() {
            debug!("Skipping {}x{} frame", frame.width(), frame.height());
            return None;
        }

        let timestamp = frame.timestamp();
        if self.last_timestamp.map(|last| timestamp < last).unwrap_or(false) {
            info!("Source jumped back to {:?}, resetting detector state", timestamp);
            self.reset();
        }
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(timestamp);

        let now = self.clock.now();
        let mut timings = FrameTimings::new();
        let input = StageInput::new(frame);

        poll_timed(&mut self.region, &input, now, &mut timings);
        let region = self.region.latest().cloned();
        let input = input.with_region(region.as_ref());

        poll_timed(&mut self.pose, &input, now, &mut timings);
        let pose = self.pose.latest().cloned();
        let input = input.with_pose(pose.as_ref());

        poll_timed(&mut self.implement, &input, now, &mut timings);
        poll_timed(&mut self.projectile, &input, now, &mut timings);
        let implement = self.implement.latest().cloned();
        let projectile = self.projectile.latest().cloned();

        let biomechanics = pose
            .as_ref()
            .map(|p| self.analyzer.analyze(p, implement.as_ref(), projectile.as_ref()));
        let status = self
            .status
            .update(timestamp, pose.as_ref(), implement.as_ref(), projectile.as_ref());

        self.frames_processed += 1;
        Some(Arc::new(FrameAnalysis {
            frame_id: frame.id(),
            timestamp,
            region,
            pose,
            implement,
            projectile,
            biomechanics,
            timings,
            status,
        }))
    }

    /// Drop all per-source history (new source or seek).
    pub fn reset(&mut self) {
        self.region.reset();
        self.pose.reset();
        self.implement.reset();
        self.projectile.reset();
        self.analyzer.reset();
        self.status.reset();
        self.first_timestamp = None;
        self.last_timestamp = None;
    }

    pub fn summary(&self) -> Option<MetricsSummary> {
        self.analyzer.summary()
    }

    /// Session state in the shape the persistence sink stores.
    pub fn snapshot(&self) -> SessionSnapshot {
        let latest = self.analyzer.latest();
        let duration_estimate = match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => Duration::ZERO,
        };
        SessionSnapshot {
            id: self.id,
            timestamp: Utc::now(),
            camera_angle: self.camera_angle,
            final_metrics: latest.map(|r| r.metrics).unwrap_or_default(),
            final_similarity: latest.map(|r| r.similarity).unwrap_or(0.0),
            final_phase: latest.map(|r| r.phase).unwrap_or(ServePhase::Preparation),
            metrics_history: self.analyzer.history().to_vec(),
            duration_estimate,
        }
    }

    /// Release the inference model if one is attached. True only the first time.
    pub fn release_model(&self) -> bool {
        self.model.as_ref().map(|m| m.release()).unwrap_or(false)
    }

    pub fn latest_metrics(&self) -> Option<ServeMetrics> {
        self.analyzer.latest().map(|r| r.metrics)
    }
}

fn poll_timed<S: FrameStage>(
    stage: &mut ThrottledStage<S>,
    input: &StageInput<'_>,
    now: Duration,
    timings: &mut FrameTimings,
) {
    match stage.poll(input, now) {
        StageRun::Ran | StageRun::Failed => timings.record(stage.name(), stage.last_duration()),
        StageRun::Throttled => {}
    }
}

impl Service<Frame> for AnalysisSession {
    type Response = Option<Arc<FrameAnalysis>>;
    type Error = AppError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, frame: Frame) -> Self::Future {
        ready(Ok(self.process(&frame)))
    }
}

pub struct AnalysisSessionBuilder {
    configuration: Configuration,
    clock: Option<Arc<dyn Clock>>,
    model: Option<ModelHandle>,
    pose_estimator: Option<Box<dyn PoseEstimator>>,
}

impl AnalysisSessionBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            clock: None,
            model: None,
            pose_estimator: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    // Adds the inference tier to both detectors, this will override the configured model path.
    pub fn model(mut self, model: ModelHandle) -> Self {
        self.model = Some(model);
        self
    }

    pub fn pose_estimator(mut self, estimator: Box<dyn PoseEstimator>) -> Self {
        self.pose_estimator = Some(estimator);
        self
    }

    pub fn build(self) -> AnalysisSession {
        let configuration = self.configuration;
        let analysis = &configuration.analysis;
        let throttle = &configuration.throttle;
        let inference = &configuration.inference;

        let model = self
            .model
            .or_else(|| ModelHandle::from_settings(inference));
        let tier_for = |class: usize| {
            model
                .clone()
                .map(|m| InferenceTier::new(m, class, inference.score_threshold))
        };

        let implement_tier = tier_for(inference.implement_class);
        let projectile_tier = tier_for(inference.projectile_class);

        let pose = match self.pose_estimator {
            Some(estimator) => PoseProvider::with_estimator(estimator, analysis.handedness),
            None => PoseProvider::synthetic(analysis.handedness),
        };

        AnalysisSession {
            id: Uuid::new_v4(),
            camera_angle: analysis.camera_angle,
            region: ThrottledStage::new(
                RegionEstimator::new(analysis.processing_width),
                throttle.pose_interval(),
            ),
            pose: ThrottledStage::new(pose, throttle.pose_interval()),
            implement: ThrottledStage::new(
                ImplementDetector::new(
                    analysis.handedness,
                    analysis.processing_width,
                    implement_tier,
                ),
                throttle.implement_interval(),
            ),
            projectile: ThrottledStage::new(
                ProjectileDetector::new(
                    configuration.projectile.search_mode,
                    analysis.processing_width,
                    projectile_tier,
                ),
                throttle.projectile_interval(),
            ),
            analyzer: BiomechanicsAnalyzer::new(analysis.handedness),
            status: TrackingStatus::new(configuration.absence_window()),
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new())),
            model,
            first_timestamp: None,
            last_timestamp: None,
            frames_processed: 0,
        }
    }
}
