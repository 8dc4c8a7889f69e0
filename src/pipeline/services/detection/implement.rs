//! Hand-held implement tracking: model box, forearm extension, then pixel pattern.
use std::time::Duration;

use image::RgbImage;
use tracing::debug;

use super::inference_tier::InferenceTier;
use crate::error::DetectionError;
use crate::pipeline::orchestration::{
    DetectionStrategy, FrameStage, StageInput, TierChain, TierContext,
};
use crate::pipeline::services::image::clustering::{ScoredPoint, SpatialClusterer};
use crate::pipeline::services::image::pixel_classifier::{classify_features, PixelClass, PixelFeatures};
use crate::pipeline::services::image::scratch_buffer::ScratchBuffer;
use crate::pipeline::types::{
    BodyRegion, DetectionBox, DetectionHistory, DetectionTier, Handedness, ImplementDetection,
    Pose,
};

/// Detections at or below this never enter the smoothing history.
pub const ACCEPTANCE_FLOOR: f32 = 0.3;
const HISTORY_SIZE: usize = 3;

const POSE_TIER_MIN_CONFIDENCE: f32 = 0.3;
const POSE_VISIBILITY_THRESHOLD: f32 = 0.3;
const DOMINANT_CONFIDENCE_CAP: f32 = 0.7;
const OFF_HAND_CONFIDENCE_CAP: f32 = 0.55;
/// Anchor sits this far past the wrist along the forearm.
const FOREARM_EXTENSION: f32 = 0.5;
const IMPLEMENT_BOX_WIDTH: f32 = 0.1;
const IMPLEMENT_BOX_HEIGHT: f32 = 0.15;

const PATTERN_TIER_MIN_CONFIDENCE: f32 = 0.3;
const PATTERN_CONFIDENCE_CAP: f32 = 0.6;
const PATTERN_STRIDE: u32 = 8;
const NEIGHBOURHOOD_RADIUS: i64 = 6;
const NEIGHBOURHOOD_STEP: usize = 3;
const POINT_SCORE_THRESHOLD: f32 = 0.4;
const PATTERN_CLUSTER_DISTANCE: f32 = 25.0;
const PATTERN_MIN_CLUSTER_POINTS: usize = 3;
/// Luma spread that counts as a fully high-contrast neighbourhood.
const FULL_CONTRAST_LUMA: f32 = 150.0;

pub struct ImplementDetector {
    chain: TierChain,
    history: DetectionHistory,
    scratch: ScratchBuffer,
}

impl ImplementDetector {
    pub fn new(handedness: Handedness, processing_width: u32, inference: Option<InferenceTier>) -> Self {
        let mut chain = TierChain::new("Implement");
        if let Some(tier) = inference {
            chain = chain.add_tier(Box::new(tier));
        }
        let chain = chain
            .add_tier(Box::new(ForearmTier::new(handedness)))
            .add_tier(Box::new(PatternTier));
        Self::with_chain(chain, processing_width)
    }

    /// Detector over a caller-supplied strategy chain.
    pub fn with_chain(chain: TierChain, processing_width: u32) -> Self {
        Self {
            chain,
            history: DetectionHistory::new(HISTORY_SIZE),
            scratch: ScratchBuffer::new(processing_width),
        }
    }

    pub fn tiers(&self) -> Vec<DetectionTier> {
        self.chain.tiers()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Select a tier for this frame and fold it into the smoothing history.
    pub fn detect(&mut self, input: &StageInput<'_>) -> Result<Option<ImplementDetection>, DetectionError> {
        let frame = input.frame;
        if !frame.is_valid() {
            return Err(DetectionError::EmptyFrame(frame.width(), frame.height()));
        }

        let processed = self.scratch.load(frame.image());
        let context = TierContext { input, processed };
        let outcome = self
            .chain
            .select(&context)
            .filter(|o| o.detection.confidence > ACCEPTANCE_FLOOR);

        let Some(outcome) = outcome else {
            if !self.history.is_empty() {
                debug!("Implement lost, clearing {} history entries", self.history.len());
            }
            self.history.clear();
            return Ok(None);
        };

        self.history.push(outcome.detection);
        let bbox = if self.history.len() >= 2 {
            self.history.mean().unwrap_or(outcome.detection)
        } else {
            outcome.detection
        };
        Ok(Some(ImplementDetection {
            bbox,
            tier: outcome.tier,
        }))
    }
}

impl FrameStage for ImplementDetector {
    type Output = ImplementDetection;

    fn process(&mut self, input: &StageInput<'_>) -> Result<Option<ImplementDetection>, DetectionError> {
        self.detect(input)
    }

    fn name(&self) -> &'static str {
        "ImplementDetector"
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

/// Extends the forearm past the wrist of the implement hand.
struct ForearmTier {
    handedness: Handedness,
}

impl ForearmTier {
    fn new(handedness: Handedness) -> Self {
        Self { handedness }
    }

    fn estimate(pose: &Pose, handedness: Handedness, cap: f32, timestamp: Duration) -> Option<DetectionBox> {
        let side = handedness.side();
        let wrist = pose.visible(side.wrist, POSE_VISIBILITY_THRESHOLD)?;
        let elbow = pose.visible(side.elbow, POSE_VISIBILITY_THRESHOLD)?;
        let x = wrist.x + FOREARM_EXTENSION * (wrist.x - elbow.x);
        let y = wrist.y + FOREARM_EXTENSION * (wrist.y - elbow.y);
        let confidence = (wrist.visibility * DOMINANT_CONFIDENCE_CAP).min(cap);
        Some(DetectionBox::new(
            x.clamp(0.0, 1.0),
            y.clamp(0.0, 1.0),
            IMPLEMENT_BOX_WIDTH,
            IMPLEMENT_BOX_HEIGHT,
            confidence,
            timestamp,
        ))
    }
}

impl DetectionStrategy for ForearmTier {
    fn tier(&self) -> DetectionTier {
        DetectionTier::Geometric
    }

    fn min_confidence(&self) -> f32 {
        POSE_TIER_MIN_CONFIDENCE
    }

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
        let Some(pose) = context.input.pose else {
            return Ok(None);
        };
        let timestamp = context.input.frame.timestamp();
        Ok(
            Self::estimate(pose, self.handedness, DOMINANT_CONFIDENCE_CAP, timestamp).or_else(|| {
                Self::estimate(pose, self.handedness.opposite(), OFF_HAND_CONFIDENCE_CAP, timestamp)
            }),
        )
    }
}

/// Frame, string bed and grip patterns near the body.
struct PatternTier;

impl PatternTier {
    /// Pixel bounds to scan: the body region padded sideways, or the whole frame.
    fn search_window(region: Option<&BodyRegion>, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let Some(region) = region else {
            return (0, 0, width, height);
        };
        let (w, h) = (width as f32, height as f32);
        let pad_x = 0.5 * region.width;
        let pad_y = 0.25 * region.height;
        let left = ((region.left() - pad_x) * w).clamp(0.0, w) as u32;
        let right = ((region.left() + region.width + pad_x) * w).clamp(0.0, w) as u32;
        let top = ((region.top() - pad_y) * h).clamp(0.0, h) as u32;
        let bottom = ((region.top() + region.height + pad_y) * h).clamp(0.0, h) as u32;
        (left, top, right, bottom)
    }

    fn point_score(image: &RgbImage, x: u32, y: u32) -> f32 {
        let (width, height) = image.dimensions();
        let (mut frame, mut strings, mut handle, mut total) = (0u32, 0u32, 0u32, 0u32);
        let (mut min_luma, mut max_luma) = (f32::MAX, f32::MIN);

        for dy in (-NEIGHBOURHOOD_RADIUS..=NEIGHBOURHOOD_RADIUS).step_by(NEIGHBOURHOOD_STEP) {
            for dx in (-NEIGHBOURHOOD_RADIUS..=NEIGHBOURHOOD_RADIUS).step_by(NEIGHBOURHOOD_STEP) {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let features = PixelFeatures::from_rgb(image.get_pixel(nx as u32, ny as u32).0);
                let luma = features.luma();
                min_luma = min_luma.min(luma);
                max_luma = max_luma.max(luma);
                total += 1;
                if classify_features(PixelClass::ImplementFrame, &features).is_match {
                    frame += 1;
                }
                if classify_features(PixelClass::ImplementStrings, &features).is_match {
                    strings += 1;
                }
                if classify_features(PixelClass::ImplementHandle, &features).is_match {
                    handle += 1;
                }
            }
        }
        if total == 0 {
            return 0.0;
        }

        let fraction = |count: u32| (2.0 * count as f32 / total as f32).min(1.0);
        let contrast = ((max_luma - min_luma) / FULL_CONTRAST_LUMA).clamp(0.0, 1.0);
        let frame_score = fraction(frame) * contrast;
        (frame_score + fraction(strings) + fraction(handle)) / 3.0
    }
}

impl DetectionStrategy for PatternTier {
    fn tier(&self) -> DetectionTier {
        DetectionTier::Heuristic
    }

    fn min_confidence(&self) -> f32 {
        PATTERN_TIER_MIN_CONFIDENCE
    }

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
        let image = context.processed;
        let (width, height) = image.dimensions();
        let (left, top, right, bottom) = Self::search_window(context.input.region, width, height);

        let mut points = Vec::new();
        for y in (top..bottom).step_by(PATTERN_STRIDE as usize) {
            for x in (left..right).step_by(PATTERN_STRIDE as usize) {
                let score = Self::point_score(image, x, y);
                if score >= POINT_SCORE_THRESHOLD {
                    points.push(ScoredPoint::new(x as f32, y as f32, score));
                }
            }
        }
        if points.len() < PATTERN_MIN_CLUSTER_POINTS {
            return Ok(None);
        }

        let clusters = SpatialClusterer::new(PATTERN_CLUSTER_DISTANCE).cluster(&points);
        let Some(best) = clusters.first().filter(|c| c.count() >= PATTERN_MIN_CLUSTER_POINTS) else {
            return Ok(None);
        };

        let stride = PATTERN_STRIDE as f32;
        let (w, h) = (width as f32, height as f32);
        Ok(Some(DetectionBox::new(
            best.centroid.0 / w,
            best.centroid.1 / h,
            (best.width() + stride) / w,
            (best.height() + stride) / h,
            (best.average_score() * 0.8).min(PATTERN_CONFIDENCE_CAP),
            context.input.frame.timestamp(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Frame;
    use crate::pipeline::types::{Landmark, LandmarkIndex, PoseSource, LANDMARK_COUNT};
    use image::Rgb;
    use std::collections::VecDeque;

    struct ScriptedTier {
        script: VecDeque<Option<DetectionBox>>,
    }

    impl DetectionStrategy for ScriptedTier {
        fn tier(&self) -> DetectionTier {
            DetectionTier::Inference
        }

        fn min_confidence(&self) -> f32 {
            0.0
        }

        fn detect(&mut self, _context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
            Ok(self.script.pop_front().flatten())
        }
    }

    fn scripted(script: Vec<Option<DetectionBox>>) -> ImplementDetector {
        let chain = TierChain::new("Implement").add_tier(Box::new(ScriptedTier {
            script: script.into(),
        }));
        ImplementDetector::with_chain(chain, 320)
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32, c: f32) -> Option<DetectionBox> {
        Some(DetectionBox::new(x, y, w, h, c, Duration::ZERO))
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(32, 24), Duration::ZERO)
    }

    fn pose_with_arm(wrist_visibility: f32, other_visibility: f32) -> Pose {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, 0.9); LANDMARK_COUNT];
        landmarks[LandmarkIndex::RightElbow.index()] = Landmark::new(0.4, 0.5, 0.0, 0.9);
        landmarks[LandmarkIndex::RightWrist.index()] = Landmark::new(0.4, 0.3, 0.0, wrist_visibility);
        landmarks[LandmarkIndex::LeftElbow.index()] = Landmark::new(0.6, 0.5, 0.0, 0.9);
        landmarks[LandmarkIndex::LeftWrist.index()] = Landmark::new(0.6, 0.7, 0.0, other_visibility);
        Pose::new(landmarks, PoseSource::Inference).unwrap()
    }

    #[test]
    fn smoothed_output_is_mean_of_history() {
        let mut detector = scripted(vec![
            bbox(0.2, 0.2, 0.1, 0.1, 0.9),
            bbox(0.4, 0.3, 0.2, 0.1, 0.7),
            bbox(0.6, 0.7, 0.3, 0.4, 0.5),
            bbox(0.8, 0.8, 0.1, 0.1, 0.9),
        ]);
        let frame = frame();
        let input = StageInput::new(&frame);

        let first = detector.detect(&input).unwrap().unwrap();
        assert_eq!(first.bbox.x, 0.2);

        let second = detector.detect(&input).unwrap().unwrap();
        assert!((second.bbox.x - 0.3).abs() < 1e-6);
        assert!((second.bbox.confidence - 0.8).abs() < 1e-6);

        let third = detector.detect(&input).unwrap().unwrap();
        assert!((third.bbox.x - 0.4).abs() < 1e-6);
        assert!((third.bbox.y - 0.4).abs() < 1e-6);
        assert!((third.bbox.width - 0.2).abs() < 1e-6);
        assert!((third.bbox.height - 0.2).abs() < 1e-6);

        // Oldest entry drops out of the three-entry ring.
        let fourth = detector.detect(&input).unwrap().unwrap();
        assert!((fourth.bbox.x - 0.6).abs() < 1e-6);
    }

    #[test]
    fn miss_below_floor_clears_history_immediately() {
        let mut detector = scripted(vec![
            bbox(0.2, 0.2, 0.1, 0.1, 0.9),
            bbox(0.4, 0.4, 0.1, 0.1, 0.9),
            bbox(0.5, 0.5, 0.1, 0.1, 0.25),
            bbox(0.9, 0.9, 0.1, 0.1, 0.9),
        ]);
        let frame = frame();
        let input = StageInput::new(&frame);

        detector.detect(&input).unwrap();
        detector.detect(&input).unwrap();
        assert_eq!(detector.history_len(), 2);

        assert!(detector.detect(&input).unwrap().is_none());
        assert_eq!(detector.history_len(), 0);

        let fresh = detector.detect(&input).unwrap().unwrap();
        assert_eq!(fresh.bbox.x, 0.9);
    }

    #[test]
    fn forearm_tier_extends_past_dominant_wrist() {
        let mut detector = ImplementDetector::new(Handedness::Right, 320, None);
        let frame = frame();
        let pose = pose_with_arm(0.9, 0.9);
        let input = StageInput::new(&frame).with_pose(Some(&pose));

        let detection = detector.detect(&input).unwrap().unwrap();
        assert_eq!(detection.tier, DetectionTier::Geometric);
        assert!((detection.bbox.x - 0.4).abs() < 1e-6);
        assert!((detection.bbox.y - 0.2).abs() < 1e-6);
        assert!((detection.bbox.confidence - 0.63).abs() < 1e-6);
    }

    #[test]
    fn off_hand_is_used_with_lower_cap() {
        let mut detector = ImplementDetector::new(Handedness::Right, 320, None);
        let frame = frame();
        let pose = pose_with_arm(0.1, 1.0);
        let input = StageInput::new(&frame).with_pose(Some(&pose));

        let detection = detector.detect(&input).unwrap().unwrap();
        assert_eq!(detection.tier, DetectionTier::Geometric);
        assert!((detection.bbox.y - 0.8).abs() < 1e-6);
        assert!((detection.bbox.confidence - OFF_HAND_CONFIDENCE_CAP).abs() < 1e-6);
    }

    fn racket_frame() -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 240, Rgb([60, 120, 60]));
        for y in 100..160 {
            for x in 200..260 {
                let color = match (x / 3) % 3 {
                    0 => [25, 25, 25],
                    1 => [235, 235, 225],
                    _ => [95, 90, 85],
                };
                img.put_pixel(x, y, Rgb(color));
            }
        }
        img
    }

    #[test]
    fn pattern_tier_finds_racket_without_pose() {
        let mut detector = ImplementDetector::new(Handedness::Right, 320, None);
        let frame = Frame::new(racket_frame(), Duration::from_millis(100));
        let detection = detector.detect(&StageInput::new(&frame)).unwrap().unwrap();

        assert_eq!(detection.tier, DetectionTier::Heuristic);
        assert!((detection.bbox.x - 0.72).abs() < 0.05, "{}", detection.bbox.x);
        assert!((detection.bbox.y - 0.54).abs() < 0.05, "{}", detection.bbox.y);
        assert!(detection.bbox.confidence > ACCEPTANCE_FLOOR);
        assert!(detection.bbox.confidence <= PATTERN_CONFIDENCE_CAP);
    }

    #[test]
    fn plain_background_has_no_implement() {
        let mut detector = ImplementDetector::new(Handedness::Right, 320, None);
        let frame = Frame::new(RgbImage::from_pixel(320, 240, Rgb([60, 120, 60])), Duration::ZERO);
        assert!(detector.detect(&StageInput::new(&frame)).unwrap().is_none());
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut detector = ImplementDetector::new(Handedness::Right, 320, None);
        let frame = Frame::new(RgbImage::new(0, 0), Duration::ZERO);
        assert_eq!(
            detector.detect(&StageInput::new(&frame)).unwrap_err(),
            DetectionError::EmptyFrame(0, 0)
        );
    }
}
