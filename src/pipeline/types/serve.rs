use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Plausible numeric range of each metric.
pub const ELBOW_ANGLE_RANGE: (f32, f32) = (30.0, 180.0);
pub const KNEE_ANGLE_RANGE: (f32, f32) = (60.0, 180.0);
pub const X_FACTOR_RANGE: (f32, f32) = (0.0, 90.0);
pub const CONTACT_HEIGHT_RANGE: (f32, f32) = (180.0, 300.0);
pub const FOLLOW_THROUGH_RANGE: (f32, f32) = (0.0, 100.0);

/// Biomechanical measurements for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ServeMetrics {
    /// Degrees at the dominant elbow.
    pub elbow_angle: f32,
    /// Degrees at the dominant knee.
    pub knee_angle: f32,
    /// Shoulder/hip line separation in degrees.
    pub x_factor: f32,
    /// Approximate contact height in centimetres.
    pub contact_height: f32,
    /// Arm extension score, 0..100.
    pub follow_through: f32,
}

impl ServeMetrics {
    pub fn clamped(self) -> Self {
        Self {
            elbow_angle: clamp_to(self.elbow_angle, ELBOW_ANGLE_RANGE),
            knee_angle: clamp_to(self.knee_angle, KNEE_ANGLE_RANGE),
            x_factor: clamp_to(self.x_factor, X_FACTOR_RANGE),
            contact_height: clamp_to(self.contact_height, CONTACT_HEIGHT_RANGE),
            follow_through: clamp_to(self.follow_through, FOLLOW_THROUGH_RANGE),
        }
    }

    /// Exponential moving average step towards `next`.
    pub fn blend(&self, next: &ServeMetrics, alpha: f32) -> ServeMetrics {
        let lerp = |a: f32, b: f32| a + (b - a) * alpha;
        ServeMetrics {
            elbow_angle: lerp(self.elbow_angle, next.elbow_angle),
            knee_angle: lerp(self.knee_angle, next.knee_angle),
            x_factor: lerp(self.x_factor, next.x_factor),
            contact_height: lerp(self.contact_height, next.contact_height),
            follow_through: lerp(self.follow_through, next.follow_through),
        }
    }
}

fn clamp_to(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Discrete position in the serving motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServePhase {
    #[default]
    Preparation,
    Loading,
    Acceleration,
    Contact,
    FollowThrough,
}

impl fmt::Display for ServePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServePhase::Preparation => "preparation",
            ServePhase::Loading => "loading",
            ServePhase::Acceleration => "acceleration",
            ServePhase::Contact => "contact",
            ServePhase::FollowThrough => "follow-through",
        };
        f.write_str(label)
    }
}

/// Where the camera sits relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CameraAngle {
    #[default]
    Side,
    Back,
    Front,
}

/// Output of the biomechanics stage for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomechanicsReport {
    pub metrics: ServeMetrics,
    pub phase: ServePhase,
    /// 0..100 match against the reference profile.
    pub similarity: f32,
    /// Normalized distance from implement centre to projectile, when both are tracked.
    pub implement_to_projectile: Option<f32>,
}
