//! Weighted deviation score against the reference serve profile.
use crate::pipeline::types::ServeMetrics;

/// Reference metrics of a well-executed serve.
pub const TARGET_PROFILE: ServeMetrics = ServeMetrics {
    elbow_angle: 165.0,
    knee_angle: 135.0,
    x_factor: 45.0,
    contact_height: 270.0,
    follow_through: 85.0,
};

/// Per-field weights, same order as the fields of [`ServeMetrics`]. Rotation matters most.
const WEIGHTS: [f32; 5] = [0.2, 0.15, 0.3, 0.2, 0.15];

fn fields(metrics: &ServeMetrics) -> [f32; 5] {
    [
        metrics.elbow_angle,
        metrics.knee_angle,
        metrics.x_factor,
        metrics.contact_height,
        metrics.follow_through,
    ]
}

/// 0..100, where 100 means every metric sits on its target.
pub fn similarity_score(metrics: &ServeMetrics) -> f32 {
    let actual = fields(metrics);
    let target = fields(&TARGET_PROFILE);
    let deviation: f32 = actual
        .iter()
        .zip(target.iter())
        .zip(WEIGHTS.iter())
        .map(|((a, t), w)| (a - t).abs() / t * w)
        .sum::<f32>()
        / WEIGHTS.len() as f32;
    ((1.0 - deviation) * 100.0).clamp(0.0, 100.0)
}
