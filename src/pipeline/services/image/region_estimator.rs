//! Coarse body region from skin, clothing and hair pixels.
use image::RgbImage;

use super::clustering::{Cluster, ScoredPoint, SpatialClusterer};
use super::pixel_classifier::{classify_features, PixelClass, PixelFeatures};
use super::scratch_buffer::ScratchBuffer;
use crate::error::DetectionError;
use crate::pipeline::orchestration::{FrameStage, StageInput};
use crate::pipeline::types::{BodyRegion, KeypointKind, RegionKeypoint};

const SAMPLE_STEP: u32 = 4;
/// Cluster link distance as a fraction of frame width.
const LINK_DISTANCE_RATIO: f32 = 0.08;
const MIN_CLUSTER_MEMBERS: usize = 30;
const MAX_CANDIDATES: usize = 1_500;
/// Highest per-pixel confidence any body profile reports.
const BODY_SCORE_CEILING: f32 = 0.9;
/// Head points are skin points within this fraction of the region height from its top.
const HEAD_BAND_RATIO: f32 = 0.15;
const HIP_OFFSET_RATIO: f32 = 0.15;

const BODY_CLASSES: [PixelClass; 3] = [PixelClass::Skin, PixelClass::Clothing, PixelClass::Hair];

#[derive(Debug, Clone, Copy)]
struct BodySample {
    point: ScoredPoint,
    class: PixelClass,
}

pub struct RegionEstimator {
    scratch: ScratchBuffer,
}

impl RegionEstimator {
    pub fn new(processing_width: u32) -> Self {
        Self {
            scratch: ScratchBuffer::new(processing_width),
        }
    }

    /// Find the dominant body-like cluster, or `None` when nothing large enough shows up.
    pub fn estimate(&mut self, image: &RgbImage) -> Option<BodyRegion> {
        let buffer = self.scratch.load(image);
        let (width, height) = buffer.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let samples = sample_body_pixels(buffer);
        if samples.len() < MIN_CLUSTER_MEMBERS {
            return None;
        }

        let points: Vec<ScoredPoint> = samples.iter().map(|s| s.point).collect();
        let clusterer = SpatialClusterer::new(width as f32 * LINK_DISTANCE_RATIO)
            .with_max_points(MAX_CANDIDATES);
        let clusters = clusterer.cluster(&points);
        let largest = clusters.first()?;
        if largest.count() < MIN_CLUSTER_MEMBERS {
            return None;
        }

        Some(build_region(largest, &samples, width as f32, height as f32))
    }
}

fn sample_body_pixels(buffer: &RgbImage) -> Vec<BodySample> {
    let (width, height) = buffer.dimensions();
    let mut samples = Vec::new();
    for y in (0..height).step_by(SAMPLE_STEP as usize) {
        for x in (0..width).step_by(SAMPLE_STEP as usize) {
            let features = PixelFeatures::from_rgb(buffer.get_pixel(x, y).0);
            let best = BODY_CLASSES
                .iter()
                .map(|&class| (class, classify_features(class, &features)))
                .filter(|(_, m)| m.is_match)
                .max_by(|a, b| a.1.confidence.total_cmp(&b.1.confidence));
            if let Some((class, matched)) = best {
                samples.push(BodySample {
                    point: ScoredPoint::new(x as f32, y as f32, matched.confidence),
                    class,
                });
            }
        }
    }
    samples
}

fn build_region(cluster: &Cluster, samples: &[BodySample], width: f32, height: f32) -> BodyRegion {
    let step = SAMPLE_STEP as f32;
    let left = cluster.min_x;
    let right = cluster.max_x + step;
    let top = cluster.min_y;
    let bottom = cluster.max_y + step;
    let region_w = right - left;
    let region_h = bottom - top;
    let center_x = (left + right) / 2.0;
    let center_y = (top + bottom) / 2.0;

    let members_of = |class: PixelClass| -> Vec<ScoredPoint> {
        cluster
            .members
            .iter()
            .map(|&i| samples[i])
            .filter(|s| s.class == class)
            .map(|s| s.point)
            .collect()
    };
    let skin = members_of(PixelClass::Skin);
    let clothing = members_of(PixelClass::Clothing);

    let head = head_position(&skin, region_h).unwrap_or((center_x, top + 0.08 * region_h));

    let (left_shoulder, right_shoulder) = match extent(&clothing) {
        Some((min_x, max_x, min_y, max_y)) => {
            let cloth_w = max_x + step - min_x;
            let cloth_h = max_y + step - min_y;
            let y = min_y + 0.1 * cloth_h;
            ((min_x + 0.2 * cloth_w, y), (max_x + step - 0.2 * cloth_w, y))
        }
        None => {
            let y = top + 0.25 * region_h;
            ((center_x - 0.2 * region_w, y), (center_x + 0.2 * region_w, y))
        }
    };
    let hip = (center_x, center_y + HIP_OFFSET_RATIO * region_h);

    let normalize = |kind: KeypointKind, (x, y): (f32, f32)| RegionKeypoint {
        kind,
        x: (x / width).clamp(0.0, 1.0),
        y: (y / height).clamp(0.0, 1.0),
    };

    BodyRegion {
        center_x: center_x / width,
        center_y: center_y / height,
        width: region_w / width,
        height: region_h / height,
        confidence: (cluster.average_score() / BODY_SCORE_CEILING).clamp(0.0, 1.0),
        keypoints: vec![
            normalize(KeypointKind::Head, head),
            normalize(KeypointKind::LeftShoulder, left_shoulder),
            normalize(KeypointKind::RightShoulder, right_shoulder),
            normalize(KeypointKind::Hip, hip),
        ],
    }
}

/// Centroid of the topmost skin points.
fn head_position(skin: &[ScoredPoint], region_h: f32) -> Option<(f32, f32)> {
    let top = skin.iter().map(|p| p.y).reduce(f32::min)?;
    let band: Vec<&ScoredPoint> = skin
        .iter()
        .filter(|p| p.y <= top + HEAD_BAND_RATIO * region_h)
        .collect();
    let n = band.len() as f32;
    let x = band.iter().map(|p| p.x).sum::<f32>() / n;
    let y = band.iter().map(|p| p.y).sum::<f32>() / n;
    Some((x, y))
}

fn extent(points: &[ScoredPoint]) -> Option<(f32, f32, f32, f32)> {
    let first = points.first()?;
    Some(points.iter().fold(
        (first.x, first.x, first.y, first.y),
        |(min_x, max_x, min_y, max_y), p| {
            (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
        },
    ))
}

impl FrameStage for RegionEstimator {
    type Output = BodyRegion;

    fn process(&mut self, input: &StageInput<'_>) -> Result<Option<BodyRegion>, DetectionError> {
        Ok(self.estimate(input.frame.image()))
    }

    fn name(&self) -> &'static str {
        "RegionEstimator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn fill(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgb(color));
            }
        }
    }

    fn person_frame() -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 240, Rgb([30, 40, 90]));
        fill(&mut img, 150, 40, 30, 30, [220, 170, 140]);
        fill(&mut img, 135, 72, 60, 80, [240, 240, 240]);
        img
    }

    #[test]
    fn finds_person_shaped_region() {
        let mut estimator = RegionEstimator::new(320);
        let region = estimator.estimate(&person_frame()).expect("region");

        assert!((region.center_x - 0.52).abs() < 0.05, "{}", region.center_x);
        assert!(region.confidence > 0.0 && region.confidence <= 1.0);
        assert!(region.height > region.width);

        let head = region.keypoint(KeypointKind::Head).unwrap();
        let shoulder = region.keypoint(KeypointKind::LeftShoulder).unwrap();
        let hip = region.keypoint(KeypointKind::Hip).unwrap();
        assert!(head.y < shoulder.y);
        assert!(shoulder.y < hip.y);
        assert!((head.x - 0.51).abs() < 0.03);
    }

    #[test]
    fn empty_background_has_no_region() {
        let mut estimator = RegionEstimator::new(320);
        let img = RgbImage::from_pixel(320, 240, Rgb([30, 40, 90]));
        assert!(estimator.estimate(&img).is_none());
    }

    #[test]
    fn small_blobs_are_ignored() {
        let mut estimator = RegionEstimator::new(320);
        let mut img = RgbImage::from_pixel(320, 240, Rgb([30, 40, 90]));
        fill(&mut img, 10, 10, 12, 12, [220, 170, 140]);
        assert!(estimator.estimate(&img).is_none());
    }
}
