//! Per-frame skeletal landmarks, from pose inference when available or
//! synthesized from the coarse body region.
use std::f32::consts::PI;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DetectionError;
use crate::pipeline::orchestration::{FrameStage, StageInput};
use crate::pipeline::services::inference::PoseEstimator;
use crate::pipeline::types::{
    BodyRegion, Handedness, KeypointKind, Landmark, LandmarkIndex, Pose, PoseSource,
    LANDMARK_COUNT,
};

/// Visibility assigned to every synthesized landmark.
pub const SYNTHETIC_VISIBILITY: f32 = 0.5;
/// Period of the limb oscillation applied to synthesized poses.
const OSCILLATION_PERIOD_SECS: f32 = 3.0;

const UPPER_ARM_RATIO: f32 = 0.18;
const FOREARM_RATIO: f32 = 0.16;
const THIGH_RATIO: f32 = 0.22;
const SHIN_RATIO: f32 = 0.2;
const HIP_SPREAD_RATIO: f32 = 0.12;

pub struct PoseProvider {
    estimator: Option<Box<dyn PoseEstimator>>,
    handedness: Handedness,
}

impl PoseProvider {
    /// A provider that only ever synthesizes.
    pub fn synthetic(handedness: Handedness) -> Self {
        Self {
            estimator: None,
            handedness,
        }
    }

    pub fn with_estimator(estimator: Box<dyn PoseEstimator>, handedness: Handedness) -> Self {
        Self {
            estimator: Some(estimator),
            handedness,
        }
    }

    pub fn has_estimator(&self) -> bool {
        self.estimator.is_some()
    }
}

impl FrameStage for PoseProvider {
    type Output = Pose;

    fn process(&mut self, input: &StageInput<'_>) -> Result<Option<Pose>, DetectionError> {
        if let Some(estimator) = self.estimator.as_mut().filter(|e| e.is_ready()) {
            match estimator.estimate(input.frame) {
                Ok(pose) => return Ok(pose),
                Err(e) => warn!("Pose inference failed, synthesizing from body region: {}", e),
            }
        }

        let Some(region) = input.region else {
            debug!("No body region available for pose synthesis");
            return Ok(None);
        };
        Ok(synthesize_pose(region, self.handedness, input.frame.timestamp()))
    }

    fn name(&self) -> &'static str {
        "PoseProvider"
    }
}

/// Deterministic skeleton built from region geometry and playback time.
///
/// The dominant arm sweeps from hanging to overhead over one period while the
/// other arm hangs loosely; the legs flex slightly in step with it.
pub fn synthesize_pose(region: &BodyRegion, handedness: Handedness, time: Duration) -> Option<Pose> {
    let swing = (2.0 * PI * time.as_secs_f32() / OSCILLATION_PERIOD_SECS).sin();
    let w = region.width;
    let h = region.height;

    let keypoint = |kind: KeypointKind, fallback: (f32, f32)| {
        region
            .keypoint(kind)
            .map(|k| (k.x, k.y))
            .unwrap_or(fallback)
    };
    let head = keypoint(KeypointKind::Head, (region.center_x, region.top() + 0.08 * h));
    // Subject's right appears on the image left for a camera-facing subject.
    let right_shoulder = keypoint(
        KeypointKind::LeftShoulder,
        (region.center_x - 0.2 * w, region.top() + 0.25 * h),
    );
    let left_shoulder = keypoint(
        KeypointKind::RightShoulder,
        (region.center_x + 0.2 * w, region.top() + 0.25 * h),
    );
    let hip = keypoint(KeypointKind::Hip, (region.center_x, region.center_y + 0.15 * h));

    let mut points = vec![(0.0f32, 0.0f32); LANDMARK_COUNT];
    let mut set = |index: LandmarkIndex, point: (f32, f32)| points[index.index()] = point;

    let face = |dx: f32, dy: f32| (head.0 + dx * w, head.1 + dy * h);
    set(LandmarkIndex::Nose, head);
    set(LandmarkIndex::LeftEyeInner, face(0.03, -0.015));
    set(LandmarkIndex::LeftEye, face(0.05, -0.015));
    set(LandmarkIndex::LeftEyeOuter, face(0.07, -0.015));
    set(LandmarkIndex::RightEyeInner, face(-0.03, -0.015));
    set(LandmarkIndex::RightEye, face(-0.05, -0.015));
    set(LandmarkIndex::RightEyeOuter, face(-0.07, -0.015));
    set(LandmarkIndex::LeftEar, face(0.1, 0.0));
    set(LandmarkIndex::RightEar, face(-0.1, 0.0));
    set(LandmarkIndex::MouthLeft, face(0.03, 0.025));
    set(LandmarkIndex::MouthRight, face(-0.03, 0.025));

    set(LandmarkIndex::LeftShoulder, left_shoulder);
    set(LandmarkIndex::RightShoulder, right_shoulder);

    // Angles measured from straight down, opening outward.
    let swinging = (0.9 * (1.0 + swing), 0.3);
    let hanging = (0.2 + 0.1 * swing, 0.2);
    let ((right_arm, right_bend), (left_arm, left_bend)) = match handedness {
        Handedness::Right => (swinging, hanging),
        Handedness::Left => (hanging, swinging),
    };
    let limb = |from: (f32, f32), angle: f32, length: f32, outward: f32| {
        (
            from.0 + outward * angle.sin() * length * h,
            from.1 + angle.cos() * length * h,
        )
    };

    let right_elbow = limb(right_shoulder, right_arm, UPPER_ARM_RATIO, -1.0);
    let right_wrist = limb(right_elbow, right_arm + right_bend, FOREARM_RATIO, -1.0);
    let left_elbow = limb(left_shoulder, left_arm, UPPER_ARM_RATIO, 1.0);
    let left_wrist = limb(left_elbow, left_arm + left_bend, FOREARM_RATIO, 1.0);
    set(LandmarkIndex::RightElbow, right_elbow);
    set(LandmarkIndex::RightWrist, right_wrist);
    set(LandmarkIndex::LeftElbow, left_elbow);
    set(LandmarkIndex::LeftWrist, left_wrist);

    let hand = |wrist: (f32, f32), elbow: (f32, f32), spread: f32| {
        let dx = wrist.0 - elbow.0;
        let dy = wrist.1 - elbow.1;
        (wrist.0 + 0.25 * dx + spread * w, wrist.1 + 0.25 * dy)
    };
    set(LandmarkIndex::RightPinky, hand(right_wrist, right_elbow, -0.01));
    set(LandmarkIndex::RightIndex, hand(right_wrist, right_elbow, 0.0));
    set(LandmarkIndex::RightThumb, hand(right_wrist, right_elbow, 0.01));
    set(LandmarkIndex::LeftPinky, hand(left_wrist, left_elbow, 0.01));
    set(LandmarkIndex::LeftIndex, hand(left_wrist, left_elbow, 0.0));
    set(LandmarkIndex::LeftThumb, hand(left_wrist, left_elbow, -0.01));

    let right_hip = (hip.0 - HIP_SPREAD_RATIO * w, hip.1);
    let left_hip = (hip.0 + HIP_SPREAD_RATIO * w, hip.1);
    set(LandmarkIndex::RightHip, right_hip);
    set(LandmarkIndex::LeftHip, left_hip);

    let knee_bend = 0.15 + 0.1 * swing;
    let right_knee = limb(right_hip, knee_bend, THIGH_RATIO, -1.0);
    let left_knee = limb(left_hip, knee_bend, THIGH_RATIO, 1.0);
    let right_ankle = limb(right_knee, -knee_bend, SHIN_RATIO, -1.0);
    let left_ankle = limb(left_knee, -knee_bend, SHIN_RATIO, 1.0);
    set(LandmarkIndex::RightKnee, right_knee);
    set(LandmarkIndex::LeftKnee, left_knee);
    set(LandmarkIndex::RightAnkle, right_ankle);
    set(LandmarkIndex::LeftAnkle, left_ankle);

    set(LandmarkIndex::RightHeel, (right_ankle.0 + 0.02 * w, right_ankle.1 + 0.02 * h));
    set(LandmarkIndex::LeftHeel, (left_ankle.0 - 0.02 * w, left_ankle.1 + 0.02 * h));
    set(LandmarkIndex::RightFootIndex, (right_ankle.0 - 0.06 * w, right_ankle.1 + 0.03 * h));
    set(LandmarkIndex::LeftFootIndex, (left_ankle.0 + 0.06 * w, left_ankle.1 + 0.03 * h));

    let landmarks = points
        .into_iter()
        .map(|(x, y)| Landmark::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0), 0.0, SYNTHETIC_VISIBILITY))
        .collect();
    Pose::new(landmarks, PoseSource::Synthetic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Frame;
    use crate::error::InferenceError;
    use crate::pipeline::services::biomechanics::classify_phase;
    use crate::pipeline::types::{RegionKeypoint, ServePhase};
    use image::RgbImage;

    fn region() -> BodyRegion {
        BodyRegion {
            center_x: 0.5,
            center_y: 0.5,
            width: 0.3,
            height: 0.6,
            confidence: 0.8,
            keypoints: vec![
                RegionKeypoint {
                    kind: KeypointKind::Head,
                    x: 0.5,
                    y: 0.25,
                },
                RegionKeypoint {
                    kind: KeypointKind::LeftShoulder,
                    x: 0.42,
                    y: 0.33,
                },
                RegionKeypoint {
                    kind: KeypointKind::RightShoulder,
                    x: 0.58,
                    y: 0.33,
                },
                RegionKeypoint {
                    kind: KeypointKind::Hip,
                    x: 0.5,
                    y: 0.59,
                },
            ],
        }
    }

    struct FakeEstimator {
        result: Result<Option<Pose>, InferenceError>,
    }

    impl PoseEstimator for FakeEstimator {
        fn estimate(&mut self, _frame: &Frame) -> Result<Option<Pose>, InferenceError> {
            self.result.clone()
        }
    }

    fn inferred_pose() -> Pose {
        let landmarks = (0..LANDMARK_COUNT)
            .map(|_| Landmark::new(0.1, 0.1, 0.0, 0.99))
            .collect();
        Pose::new(landmarks, PoseSource::Inference).unwrap()
    }

    #[test]
    fn synthesized_pose_is_complete_and_marked() {
        let pose = synthesize_pose(&region(), Handedness::Right, Duration::from_millis(400)).unwrap();
        assert_eq!(pose.landmarks().len(), LANDMARK_COUNT);
        assert!(pose.is_synthetic());
        for landmark in pose.landmarks() {
            assert!((0.0..=1.0).contains(&landmark.x));
            assert!((0.0..=1.0).contains(&landmark.y));
            assert_eq!(landmark.visibility, SYNTHETIC_VISIBILITY);
        }
        let nose = pose.landmark(LandmarkIndex::Nose);
        let hip = pose.landmark(LandmarkIndex::RightHip);
        assert!(nose.y < hip.y);
    }

    #[test]
    fn synthesis_is_deterministic_and_oscillates() {
        let a = synthesize_pose(&region(), Handedness::Right, Duration::from_millis(750)).unwrap();
        let b = synthesize_pose(&region(), Handedness::Right, Duration::from_millis(750)).unwrap();
        let c = synthesize_pose(&region(), Handedness::Right, Duration::from_millis(2250)).unwrap();
        assert_eq!(a, b);

        let wrist_a = a.landmark(LandmarkIndex::RightWrist);
        let wrist_c = c.landmark(LandmarkIndex::RightWrist);
        // Quarter period: arm raised; three quarters: arm hanging.
        assert!(wrist_a.y < wrist_c.y);
    }

    #[test]
    fn left_handed_synthesis_swings_left_arm() {
        for ms in [0u64, 400, 750, 1200, 1500, 2250, 2800] {
            let time = Duration::from_millis(ms);
            let right = synthesize_pose(&region(), Handedness::Right, time).unwrap();
            let left = synthesize_pose(&region(), Handedness::Left, time).unwrap();

            let right_wrist = right.landmark(LandmarkIndex::RightWrist);
            let left_wrist = left.landmark(LandmarkIndex::LeftWrist);
            assert!((right_wrist.y - left_wrist.y).abs() < 1e-5);
            assert!((right_wrist.x + left_wrist.x - 1.0).abs() < 1e-5);
            assert_eq!(
                classify_phase(&right, Handedness::Right),
                classify_phase(&left, Handedness::Left)
            );
        }

        let raised = synthesize_pose(&region(), Handedness::Left, Duration::from_millis(750)).unwrap();
        let hanging = synthesize_pose(&region(), Handedness::Left, Duration::from_millis(2250)).unwrap();
        assert!(
            raised.landmark(LandmarkIndex::LeftWrist).y
                < hanging.landmark(LandmarkIndex::LeftWrist).y
        );
        assert_ne!(classify_phase(&raised, Handedness::Left), ServePhase::Preparation);
    }

    #[test]
    fn estimator_takes_precedence() {
        let frame = Frame::new(RgbImage::new(8, 8), Duration::ZERO);
        let region = region();
        let input = StageInput::new(&frame).with_region(Some(&region));
        let estimator = FakeEstimator {
            result: Ok(Some(inferred_pose())),
        };
        let mut provider = PoseProvider::with_estimator(Box::new(estimator), Handedness::Right);
        let pose = provider.process(&input).unwrap().unwrap();
        assert_eq!(pose.source, PoseSource::Inference);
    }

    #[test]
    fn failing_estimator_falls_back_to_synthesis() {
        let frame = Frame::new(RgbImage::new(8, 8), Duration::ZERO);
        let region = region();
        let input = StageInput::new(&frame).with_region(Some(&region));
        let estimator = FakeEstimator {
            result: Err(InferenceError::RunFailed("gpu lost".to_string())),
        };
        let mut provider = PoseProvider::with_estimator(Box::new(estimator), Handedness::Right);
        let pose = provider.process(&input).unwrap().unwrap();
        assert!(pose.is_synthetic());
    }

    #[test]
    fn no_region_and_no_estimator_yields_nothing() {
        let frame = Frame::new(RgbImage::new(8, 8), Duration::ZERO);
        let mut provider = PoseProvider::synthetic(Handedness::Right);
        assert!(provider.process(&StageInput::new(&frame)).unwrap().is_none());
    }
}
