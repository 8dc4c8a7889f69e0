use serde::{Deserialize, Serialize};
use tracing::trace;

use super::angles::{contact_height, follow_through, joint_angle, x_factor};
use super::phase::{calibration, classify_phase};
use super::similarity::similarity_score;
use crate::pipeline::types::{
    BiomechanicsReport, Handedness, ImplementDetection, LandmarkIndex, Pose, ProjectileDetection,
    ServeMetrics, ServePhase,
};

/// Weight of the newest frame in the metrics moving average.
pub const SMOOTHING_ALPHA: f32 = 0.4;
pub const HISTORY_CAPACITY: usize = 120;
/// Samples kept when the history overflows.
pub const HISTORY_RETAIN: usize = 60;

/// Aggregate over the metrics history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub samples: usize,
    pub mean: ServeMetrics,
    pub mean_similarity: f32,
}

/// Turns pose plus detections into per-frame metrics, phase and score.
pub struct BiomechanicsAnalyzer {
    handedness: Handedness,
    smoothed: Option<ServeMetrics>,
    history: Vec<ServeMetrics>,
    latest: Option<BiomechanicsReport>,
}

impl BiomechanicsAnalyzer {
    pub fn new(handedness: Handedness) -> Self {
        Self {
            handedness,
            smoothed: None,
            history: Vec::with_capacity(HISTORY_CAPACITY + 1),
            latest: None,
        }
    }

    pub fn analyze(
        &mut self,
        pose: &Pose,
        implement: Option<&ImplementDetection>,
        projectile: Option<&ProjectileDetection>,
    ) -> BiomechanicsReport {
        let phase = classify_phase(pose, self.handedness);
        let raw = raw_metrics(pose, self.handedness, phase, implement);
        let metrics = match &self.smoothed {
            Some(previous) => previous.blend(&raw, SMOOTHING_ALPHA).clamped(),
            None => raw,
        };
        self.smoothed = Some(metrics);
        self.record(metrics);

        let similarity = similarity_score(&metrics);
        trace!("Phase {} similarity {:.1}", phase, similarity);

        let report = BiomechanicsReport {
            metrics,
            phase,
            similarity,
            implement_to_projectile: implement
                .zip(projectile)
                .map(|(i, p)| i.bbox.distance_to(&p.bbox)),
        };
        self.latest = Some(report.clone());
        report
    }

    fn record(&mut self, metrics: ServeMetrics) {
        self.history.push(metrics);
        if self.history.len() > HISTORY_CAPACITY {
            let excess = self.history.len() - HISTORY_RETAIN;
            self.history.drain(..excess);
        }
    }

    /// Metrics of every processed frame still retained, oldest first.
    pub fn history(&self) -> &[ServeMetrics] {
        &self.history
    }

    pub fn latest(&self) -> Option<&BiomechanicsReport> {
        self.latest.as_ref()
    }

    pub fn summary(&self) -> Option<MetricsSummary> {
        if self.history.is_empty() {
            return None;
        }
        let n = self.history.len() as f32;
        let mean_of = |f: fn(&ServeMetrics) -> f32| self.history.iter().map(f).sum::<f32>() / n;
        Some(MetricsSummary {
            samples: self.history.len(),
            mean: ServeMetrics {
                elbow_angle: mean_of(|m| m.elbow_angle),
                knee_angle: mean_of(|m| m.knee_angle),
                x_factor: mean_of(|m| m.x_factor),
                contact_height: mean_of(|m| m.contact_height),
                follow_through: mean_of(|m| m.follow_through),
            },
            mean_similarity: self.history.iter().map(similarity_score).sum::<f32>() / n,
        })
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
        self.history.clear();
        self.latest = None;
    }
}

fn raw_metrics(
    pose: &Pose,
    handedness: Handedness,
    phase: ServePhase,
    implement: Option<&ImplementDetection>,
) -> ServeMetrics {
    let side = handedness.side();
    let at = |index: LandmarkIndex| pose.landmark(index).position();
    let (elbow_factor, knee_factor) = calibration(phase);

    let wrist = at(side.wrist);
    let contact_y = implement.map(|i| i.bbox.y).unwrap_or(wrist.1);

    ServeMetrics {
        elbow_angle: joint_angle(at(side.shoulder), at(side.elbow), wrist) * elbow_factor,
        knee_angle: joint_angle(at(side.hip), at(side.knee), at(side.ankle)) * knee_factor,
        x_factor: x_factor(
            at(LandmarkIndex::LeftShoulder),
            at(LandmarkIndex::RightShoulder),
            at(LandmarkIndex::LeftHip),
            at(LandmarkIndex::RightHip),
        ),
        contact_height: contact_height(contact_y),
        follow_through: follow_through(at(side.shoulder), wrist),
    }
    .clamped()
}
