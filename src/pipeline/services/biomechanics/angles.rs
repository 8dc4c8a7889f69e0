//! Planar joint geometry on frame-normalized landmark positions.
use crate::pipeline::types::{CONTACT_HEIGHT_RANGE, FOLLOW_THROUGH_RANGE};

/// Shoulder-to-wrist distance that counts as full extension.
const FULL_EXTENSION: f32 = 0.4;

type Point = (f32, f32);

/// Angle at `b` in degrees between the rays towards `a` and `c`.
///
/// Degenerate inputs (a zero-length ray) give 0.
pub fn joint_angle(a: Point, b: Point, c: Point) -> f32 {
    let ba = (a.0 - b.0, a.1 - b.1);
    let bc = (c.0 - b.0, c.1 - b.1);
    let norm = (ba.0.hypot(ba.1)) * (bc.0.hypot(bc.1));
    if norm <= f32::EPSILON {
        return 0.0;
    }
    let cosine = ((ba.0 * bc.0 + ba.1 * bc.1) / norm).clamp(-1.0, 1.0);
    cosine.acos().to_degrees()
}

/// Separation in degrees between the shoulder line and the hip line.
pub fn x_factor(left_shoulder: Point, right_shoulder: Point, left_hip: Point, right_hip: Point) -> f32 {
    let shoulders = (right_shoulder.1 - left_shoulder.1).atan2(right_shoulder.0 - left_shoulder.0);
    let hips = (right_hip.1 - left_hip.1).atan2(right_hip.0 - left_hip.0);
    let diff = (shoulders - hips).to_degrees().abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Linear remap of a normalized height (0 = top of frame) onto the contact band in cm.
pub fn contact_height(y: f32) -> f32 {
    let (low, high) = CONTACT_HEIGHT_RANGE;
    high - y.clamp(0.0, 1.0) * (high - low)
}

/// Extension score proportional to shoulder-to-wrist distance.
pub fn follow_through(shoulder: Point, wrist: Point) -> f32 {
    let distance = (wrist.0 - shoulder.0).hypot(wrist.1 - shoulder.1);
    (distance / FULL_EXTENSION * 100.0).clamp(FOLLOW_THROUGH_RANGE.0, FOLLOW_THROUGH_RANGE.1)
}
