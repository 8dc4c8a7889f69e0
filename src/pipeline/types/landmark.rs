use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of landmark slots in a [`Pose`].
pub const LANDMARK_COUNT: usize = 33;

/// Anatomical meaning of each pose slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which arm holds the implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    #[default]
    Right,
    Left,
}

/// Landmark slots for one side of the body.
#[derive(Debug, Clone, Copy)]
pub struct BodySide {
    pub shoulder: LandmarkIndex,
    pub elbow: LandmarkIndex,
    pub wrist: LandmarkIndex,
    pub hip: LandmarkIndex,
    pub knee: LandmarkIndex,
    pub ankle: LandmarkIndex,
}

impl Handedness {
    pub fn side(self) -> BodySide {
        match self {
            Handedness::Right => BodySide {
                shoulder: LandmarkIndex::RightShoulder,
                elbow: LandmarkIndex::RightElbow,
                wrist: LandmarkIndex::RightWrist,
                hip: LandmarkIndex::RightHip,
                knee: LandmarkIndex::RightKnee,
                ankle: LandmarkIndex::RightAnkle,
            },
            Handedness::Left => BodySide {
                shoulder: LandmarkIndex::LeftShoulder,
                elbow: LandmarkIndex::LeftElbow,
                wrist: LandmarkIndex::LeftWrist,
                hip: LandmarkIndex::LeftHip,
                knee: LandmarkIndex::LeftKnee,
                ankle: LandmarkIndex::LeftAnkle,
            },
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Handedness::Right => Handedness::Left,
            Handedness::Left => Handedness::Right,
        }
    }
}

/// A single estimated anatomical point in frame-normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Confidence in [0, 1].
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: visibility.clamp(0.0, 1.0),
        }
    }

    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn distance_to(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Where a pose came from. Synthetic poses are never ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseSource {
    Inference,
    Synthetic,
}

/// Full ordered landmark set for one frame. Replaced each frame, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    landmarks: Vec<Landmark>,
    pub source: PoseSource,
}

impl Pose {
    /// Returns `None` unless exactly [`LANDMARK_COUNT`] landmarks are given.
    pub fn new(landmarks: Vec<Landmark>, source: PoseSource) -> Option<Self> {
        if landmarks.len() != LANDMARK_COUNT {
            return None;
        }
        Some(Self { landmarks, source })
    }

    pub fn landmark(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index.index()]
    }

    /// The landmark if it meets the visibility threshold.
    pub fn visible(&self, index: LandmarkIndex, threshold: f32) -> Option<&Landmark> {
        let landmark = self.landmark(index);
        landmark.is_visible(threshold).then_some(landmark)
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == PoseSource::Synthetic
    }
}
