//! Stateless serve phase classification from current pose geometry.
use crate::pipeline::types::{Handedness, Pose, ServePhase};

const LANDMARK_VISIBILITY: f32 = 0.3;

// Thresholds on wrist y minus shoulder y; y grows downward.
const PREPARATION_ABOVE: f32 = 0.1;
const LOADING_ABOVE: f32 = -0.05;
const ACCELERATION_ABOVE: f32 = -0.15;
const CONTACT_ABOVE: f32 = -0.25;

/// Phase for this pose alone. Missing landmarks read as preparation.
pub fn classify_phase(pose: &Pose, handedness: Handedness) -> ServePhase {
    let side = handedness.side();
    let (Some(wrist), Some(shoulder)) = (
        pose.visible(side.wrist, LANDMARK_VISIBILITY),
        pose.visible(side.shoulder, LANDMARK_VISIBILITY),
    ) else {
        return ServePhase::Preparation;
    };
    phase_for_height_diff(wrist.y - shoulder.y)
}

pub fn phase_for_height_diff(height_diff: f32) -> ServePhase {
    if height_diff > PREPARATION_ABOVE {
        ServePhase::Preparation
    } else if height_diff > LOADING_ABOVE {
        ServePhase::Loading
    } else if height_diff > ACCELERATION_ABOVE {
        ServePhase::Acceleration
    } else if height_diff > CONTACT_ABOVE {
        ServePhase::Contact
    } else {
        ServePhase::FollowThrough
    }
}

/// Multipliers applied to the raw (elbow, knee) angles in each phase.
pub fn calibration(phase: ServePhase) -> (f32, f32) {
    match phase {
        ServePhase::Preparation => (1.0, 1.0),
        ServePhase::Loading => (0.95, 0.9),
        ServePhase::Acceleration => (1.05, 1.0),
        ServePhase::Contact => (1.1, 1.05),
        ServePhase::FollowThrough => (1.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{Landmark, LandmarkIndex, PoseSource, LANDMARK_COUNT};

    fn pose(wrist_y: f32, shoulder_y: f32) -> Pose {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, 0.9); LANDMARK_COUNT];
        landmarks[LandmarkIndex::RightWrist.index()] = Landmark::new(0.4, wrist_y, 0.0, 0.9);
        landmarks[LandmarkIndex::RightShoulder.index()] = Landmark::new(0.45, shoulder_y, 0.0, 0.9);
        Pose::new(landmarks, PoseSource::Inference).unwrap()
    }

    #[test]
    fn thresholds_map_to_phases() {
        assert_eq!(phase_for_height_diff(0.3), ServePhase::Preparation);
        assert_eq!(phase_for_height_diff(0.0), ServePhase::Loading);
        assert_eq!(phase_for_height_diff(-0.1), ServePhase::Acceleration);
        assert_eq!(phase_for_height_diff(-0.2), ServePhase::Contact);
        assert_eq!(phase_for_height_diff(-0.4), ServePhase::FollowThrough);
    }

    #[test]
    fn identical_pose_gives_identical_phase_regardless_of_order() {
        let high = pose(0.1, 0.4);
        let low = pose(0.7, 0.4);
        let first = classify_phase(&high, Handedness::Right);
        assert_eq!(classify_phase(&low, Handedness::Right), ServePhase::Preparation);
        assert_eq!(classify_phase(&high, Handedness::Right), first);
        assert_eq!(first, ServePhase::FollowThrough);
    }

    #[test]
    fn phase_can_move_backward() {
        assert_eq!(classify_phase(&pose(0.2, 0.4), Handedness::Right), ServePhase::Contact);
        assert_eq!(classify_phase(&pose(0.45, 0.4), Handedness::Right), ServePhase::Loading);
    }

    #[test]
    fn hidden_wrist_reads_as_preparation() {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, 0.9); LANDMARK_COUNT];
        landmarks[LandmarkIndex::RightWrist.index()] = Landmark::new(0.4, 0.1, 0.0, 0.05);
        let pose = Pose::new(landmarks, PoseSource::Inference).unwrap();
        assert_eq!(classify_phase(&pose, Handedness::Right), ServePhase::Preparation);
    }
}
