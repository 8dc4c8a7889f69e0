use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Location of a tracked entity in one frame. `x`/`y` are the box centre,
/// all values frame-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub timestamp: Duration,
}

impl DetectionBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32, confidence: f32, timestamp: Duration) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            timestamp,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn top(&self) -> f32 {
        self.y - self.height / 2.0
    }

    pub fn distance_to(&self, other: &DetectionBox) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Strategy in the ordered fallback chain that produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionTier {
    /// Model bounding box.
    Inference,
    /// Estimated from pose landmarks.
    Geometric,
    /// Pixel colour / pattern heuristics.
    Heuristic,
    /// Last-resort brightest region.
    Fallback,
}

impl DetectionTier {
    pub fn label(&self) -> &'static str {
        match self {
            DetectionTier::Inference => "inference",
            DetectionTier::Geometric => "pose-derived",
            DetectionTier::Heuristic => "pixel heuristic",
            DetectionTier::Fallback => "brightest region",
        }
    }
}

/// Smoothed implement location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementDetection {
    pub bbox: DetectionBox,
    pub tier: DetectionTier,
}

/// One point of the projectile trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub x: f32,
    pub y: f32,
    pub timestamp: Duration,
}

/// Smoothed projectile location plus its recent trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileDetection {
    pub bbox: DetectionBox,
    pub tier: DetectionTier,
    pub trail: Vec<TrailPoint>,
    /// True when no new hit arrived this frame and the value is held over.
    pub carried: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypointKind {
    Head,
    LeftShoulder,
    RightShoulder,
    Hip,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionKeypoint {
    pub kind: KeypointKind,
    pub x: f32,
    pub y: f32,
}

/// Coarse body bounding region derived from pixel classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRegion {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub keypoints: Vec<RegionKeypoint>,
}

impl BodyRegion {
    pub fn keypoint(&self, kind: KeypointKind) -> Option<&RegionKeypoint> {
        self.keypoints.iter().find(|k| k.kind == kind)
    }

    pub fn left(&self) -> f32 {
        self.center_x - self.width / 2.0
    }

    pub fn top(&self) -> f32 {
        self.center_y - self.height / 2.0
    }
}
