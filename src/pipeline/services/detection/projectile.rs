//! Small, fast, brightly coloured projectile tracking with a motion trail,
//! short-horizon extrapolation and hold-over hysteresis.
use std::time::Duration;

use tracing::debug;

use super::inference_tier::InferenceTier;
use crate::config::SearchMode;
use crate::error::DetectionError;
use crate::pipeline::orchestration::{
    DetectionStrategy, FrameStage, StageInput, TierChain, TierContext, TierOutcome,
};
use crate::pipeline::services::image::clustering::{Cluster, ScoredPoint, SpatialClusterer};
use crate::pipeline::services::image::pixel_classifier::{classify_features, PixelClass, PixelFeatures};
use crate::pipeline::services::image::scratch_buffer::ScratchBuffer;
use crate::pipeline::types::{
    DetectionBox, DetectionHistory, DetectionTier, MotionTrail, ProjectileDetection, TrailPoint,
};

const HISTORY_SIZE: usize = 5;
const TRAIL_WINDOW: Duration = Duration::from_secs(1);
/// How long the last detection is held after the first missed frame.
pub const HOLD_TIMEOUT: Duration = Duration::from_secs(1);
const SMOOTHING_WINDOW: usize = 3;
/// Fraction of one detection step to project forward.
const EXTRAPOLATION_STEP: f32 = 0.3;
const CONFIDENCE_BOOST: f32 = 1.2;
pub const CONFIDENCE_CEILING: f32 = 0.95;

const STANDARD_STRIDE: u32 = 4;
const EXHAUSTIVE_STRIDE: u32 = 2;
const COLOR_CLUSTER_DISTANCE: f32 = 30.0;
const COLOR_MIN_CLUSTER_POINTS: usize = 3;
const MIN_CLUSTER_SCORE: f32 = 0.15;
const COLOR_TIER_MIN_CONFIDENCE: f32 = 0.18;
/// Clusters more elongated than this are penalised.
const MAX_REGULAR_ASPECT: f32 = 1.5;
const MIN_SHAPE_FACTOR: f32 = 0.2;
/// Plausible projectile extent in pixels of a frame at processing width.
const SIZE_BAND: (f32, f32) = (4.0, 80.0);
const IMPLAUSIBLE_SIZE_FACTOR: f32 = 0.3;

const FALLBACK_CONFIDENCE: f32 = 0.2;
const FALLBACK_TIER_MIN_CONFIDENCE: f32 = 0.15;
const FALLBACK_MIN_BRIGHTNESS: f32 = 200.0;
const FALLBACK_STRIDE: u32 = 4;
/// Central window searched by the fallback, as fractions of the frame.
const FALLBACK_WINDOW: (f32, f32) = (0.2, 0.8);
const FALLBACK_BOX: (f32, f32) = (0.03, 0.04);

pub struct ProjectileDetector {
    chain: TierChain,
    history: DetectionHistory,
    trail: MotionTrail,
    scratch: ScratchBuffer,
    last_emitted: Option<ProjectileDetection>,
    miss_started: Option<Duration>,
}

impl ProjectileDetector {
    pub fn new(search_mode: SearchMode, processing_width: u32, inference: Option<InferenceTier>) -> Self {
        let mut chain = TierChain::new("Projectile");
        if let Some(tier) = inference {
            chain = chain.add_tier(Box::new(tier));
        }
        let chain = chain
            .add_tier(Box::new(ColorTier::new(search_mode)))
            .add_tier(Box::new(BrightestRegionTier));
        Self::with_chain(chain, processing_width)
    }

    pub fn with_chain(chain: TierChain, processing_width: u32) -> Self {
        Self {
            chain,
            history: DetectionHistory::new(HISTORY_SIZE),
            trail: MotionTrail::new(TRAIL_WINDOW),
            scratch: ScratchBuffer::new(processing_width),
            last_emitted: None,
            miss_started: None,
        }
    }

    pub fn tiers(&self) -> Vec<DetectionTier> {
        self.chain.tiers()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn trail_len(&self) -> usize {
        self.trail.len()
    }

    pub fn detect(&mut self, input: &StageInput<'_>) -> Result<Option<ProjectileDetection>, DetectionError> {
        let frame = input.frame;
        if !frame.is_valid() {
            return Err(DetectionError::EmptyFrame(frame.width(), frame.height()));
        }
        let now = frame.timestamp();

        let processed = self.scratch.load(frame.image());
        let context = TierContext { input, processed };
        match self.chain.select(&context) {
            Some(outcome) => Ok(Some(self.accept(outcome, now))),
            None => Ok(self.hold(now)),
        }
    }

    fn accept(&mut self, outcome: TierOutcome, now: Duration) -> ProjectileDetection {
        let raw = outcome.detection;
        self.miss_started = None;
        self.trail.record(TrailPoint {
            x: raw.x,
            y: raw.y,
            timestamp: now,
        });
        self.history.push(raw);

        let detection = ProjectileDetection {
            bbox: self.smoothed().unwrap_or(raw),
            tier: outcome.tier,
            trail: self.trail.points(),
            carried: false,
        };
        self.last_emitted = Some(detection.clone());
        detection
    }

    /// Mean of the last few hits, nudged along their velocity.
    fn smoothed(&self) -> Option<DetectionBox> {
        let recent: Vec<&DetectionBox> = self.history.recent(SMOOTHING_WINDOW).collect();
        if recent.len() < 2 {
            return None;
        }
        let n = recent.len() as f32;
        let mean = |f: fn(&DetectionBox) -> f32| recent.iter().map(|d| f(d)).sum::<f32>() / n;
        let (mut x, mut y) = (mean(|d| d.x), mean(|d| d.y));

        let newest = recent[recent.len() - 1];
        if recent.len() >= SMOOTHING_WINDOW {
            let oldest = recent[0];
            let steps = (recent.len() - 1) as f32;
            x += EXTRAPOLATION_STEP * (newest.x - oldest.x) / steps;
            y += EXTRAPOLATION_STEP * (newest.y - oldest.y) / steps;
        }

        Some(DetectionBox::new(
            x.clamp(0.0, 1.0),
            y.clamp(0.0, 1.0),
            mean(|d| d.width),
            mean(|d| d.height),
            (mean(|d| d.confidence) * CONFIDENCE_BOOST).min(CONFIDENCE_CEILING),
            newest.timestamp,
        ))
    }

    /// Keep showing the last detection until the hold timeout runs out.
    fn hold(&mut self, now: Duration) -> Option<ProjectileDetection> {
        let first_miss = *self.miss_started.get_or_insert(now);
        if now.saturating_sub(first_miss) > HOLD_TIMEOUT {
            if self.last_emitted.is_some() {
                debug!(
                    "Projectile missing for {:.2}s, clearing trail",
                    now.saturating_sub(first_miss).as_secs_f32()
                );
            }
            self.clear();
            return None;
        }

        let mut held = self.last_emitted.clone()?;
        held.carried = true;
        Some(held)
    }

    fn clear(&mut self) {
        self.history.clear();
        self.trail.clear();
        self.last_emitted = None;
    }
}

impl FrameStage for ProjectileDetector {
    type Output = ProjectileDetection;

    fn process(&mut self, input: &StageInput<'_>) -> Result<Option<ProjectileDetection>, DetectionError> {
        self.detect(input)
    }

    fn name(&self) -> &'static str {
        "ProjectileDetector"
    }

    fn reset(&mut self) {
        self.clear();
        self.miss_started = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct ColorHit {
    point: ScoredPoint,
    intensity: f32,
}

/// Multi-profile colour hits, clustered and scored for ball-likeness.
struct ColorTier {
    stride: u32,
}

impl ColorTier {
    fn new(search_mode: SearchMode) -> Self {
        let stride = match search_mode {
            SearchMode::Standard => STANDARD_STRIDE,
            SearchMode::Exhaustive => EXHAUSTIVE_STRIDE,
        };
        Self { stride }
    }

    /// Sampling stride and size band at processing resolution.
    ///
    /// Both are tuned for frames at processing width; when the scratch buffer
    /// downscales, the ball shrinks with it, so the grid tightens to match.
    fn grid(&self, source_width: u32, processed_width: u32) -> (u32, (f32, f32)) {
        let scale = if source_width > processed_width && source_width > 0 {
            processed_width as f32 / source_width as f32
        } else {
            1.0
        };
        let stride = ((self.stride as f32 * scale).round() as u32).max(1);
        (stride, (SIZE_BAND.0 * scale, SIZE_BAND.1 * scale))
    }

    fn score(&self, cluster: &Cluster, hits: &[ColorHit], stride: u32, size_band: (f32, f32)) -> f32 {
        let stride = stride as f32;
        let extent_w = cluster.width() + stride;
        let extent_h = cluster.height() + stride;

        let cells = (extent_w / stride) * (extent_h / stride);
        let density = (cluster.count() as f32 / cells).min(1.0);
        let intensity = cluster.members.iter().map(|&i| hits[i].intensity).sum::<f32>()
            / cluster.count() as f32;
        let intensity_factor = 0.5 + 0.5 * intensity;

        let aspect = extent_w.max(extent_h) / extent_w.min(extent_h);
        let shape = if aspect <= MAX_REGULAR_ASPECT {
            1.0
        } else {
            (MAX_REGULAR_ASPECT / aspect).max(MIN_SHAPE_FACTOR)
        };
        let extent = extent_w.max(extent_h);
        let size = if (size_band.0..=size_band.1).contains(&extent) {
            1.0
        } else {
            IMPLAUSIBLE_SIZE_FACTOR
        };

        density * intensity_factor * cluster.average_score() * shape * size
    }
}

impl DetectionStrategy for ColorTier {
    fn tier(&self) -> DetectionTier {
        DetectionTier::Heuristic
    }

    fn min_confidence(&self) -> f32 {
        COLOR_TIER_MIN_CONFIDENCE
    }

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
        let image = context.processed;
        let (width, height) = image.dimensions();
        let (stride, size_band) = self.grid(context.input.frame.width(), width);

        let mut hits = Vec::new();
        for y in (0..height).step_by(stride as usize) {
            for x in (0..width).step_by(stride as usize) {
                let features = PixelFeatures::from_rgb(image.get_pixel(x, y).0);
                let matched = classify_features(PixelClass::Projectile, &features);
                if matched.is_match {
                    hits.push(ColorHit {
                        point: ScoredPoint::new(x as f32, y as f32, matched.confidence),
                        intensity: matched.intensity,
                    });
                }
            }
        }
        if hits.len() < COLOR_MIN_CLUSTER_POINTS {
            return Ok(None);
        }

        let points: Vec<ScoredPoint> = hits.iter().map(|h| h.point).collect();
        let clusters = SpatialClusterer::new(COLOR_CLUSTER_DISTANCE).cluster(&points);
        let best = clusters
            .iter()
            .filter(|c| c.count() >= COLOR_MIN_CLUSTER_POINTS)
            .map(|c| (c, self.score(c, &hits, stride, size_band)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        let Some((cluster, score)) = best else {
            return Ok(None);
        };
        if score < MIN_CLUSTER_SCORE {
            debug!("Best projectile cluster scored {:.3}, rejecting", score);
            return Ok(None);
        }

        let stride = stride as f32;
        let (w, h) = (width as f32, height as f32);
        Ok(Some(DetectionBox::new(
            (cluster.centroid.0 / w).clamp(0.0, 1.0),
            (cluster.centroid.1 / h).clamp(0.0, 1.0),
            (cluster.width() + stride) / w,
            (cluster.height() + stride) / h,
            score.min(CONFIDENCE_CEILING),
            context.input.frame.timestamp(),
        )))
    }
}

/// Brightest sampled point in the central part of the frame.
struct BrightestRegionTier;

impl DetectionStrategy for BrightestRegionTier {
    fn tier(&self) -> DetectionTier {
        DetectionTier::Fallback
    }

    fn min_confidence(&self) -> f32 {
        FALLBACK_TIER_MIN_CONFIDENCE
    }

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
        let image = context.processed;
        let (width, height) = image.dimensions();
        let (lo, hi) = FALLBACK_WINDOW;
        let x_range = (width as f32 * lo) as u32..(width as f32 * hi) as u32;
        let y_range = (height as f32 * lo) as u32..(height as f32 * hi) as u32;

        let mut brightest: Option<(u32, u32, f32)> = None;
        for y in y_range.step_by(FALLBACK_STRIDE as usize) {
            for x in x_range.clone().step_by(FALLBACK_STRIDE as usize) {
                let brightness = PixelFeatures::from_rgb(image.get_pixel(x, y).0).brightness;
                if brightness > FALLBACK_MIN_BRIGHTNESS
                    && brightest.map(|(_, _, b)| brightness > b).unwrap_or(true)
                {
                    brightest = Some((x, y, brightness));
                }
            }
        }

        Ok(brightest.map(|(x, y, _)| {
            DetectionBox::new(
                x as f32 / width as f32,
                y as f32 / height as f32,
                FALLBACK_BOX.0,
                FALLBACK_BOX.1,
                FALLBACK_CONFIDENCE,
                context.input.frame.timestamp(),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Frame;
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;

    const DARK: [u8; 3] = [20, 20, 20];
    const BALL: [u8; 3] = [230, 240, 40];

    fn dark_frame() -> RgbImage {
        RgbImage::from_pixel(320, 240, Rgb(DARK))
    }

    fn ball_frame(cx: u32, cy: u32) -> RgbImage {
        let mut img = dark_frame();
        for y in cy - 5..cy + 5 {
            for x in cx - 5..cx + 5 {
                img.put_pixel(x, y, Rgb(BALL));
            }
        }
        img
    }

    /// 10x10 ball centred at (0.5, 0.3) on a dark frame of any size.
    fn sized_ball_frame(width: u32, height: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb(DARK));
        let (cx, cy) = (width / 2, height * 3 / 10);
        for y in cy - 5..cy + 5 {
            for x in cx - 5..cx + 5 {
                img.put_pixel(x, y, Rgb(BALL));
            }
        }
        img
    }

    fn run(detector: &mut ProjectileDetector, image: RgbImage, ms: u64) -> Option<ProjectileDetection> {
        let frame = Frame::new(image, Duration::from_millis(ms));
        detector.detect(&StageInput::new(&frame)).unwrap()
    }

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

        fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
            let timestamp = context.input.frame.timestamp();
            Ok(self.script.pop_front().flatten().map(|mut d| {
                d.timestamp = timestamp;
                d
            }))
        }
    }

    fn scripted(script: Vec<Option<(f32, f32, f32)>>) -> ProjectileDetector {
        let script = script
            .into_iter()
            .map(|s| s.map(|(x, y, c)| DetectionBox::new(x, y, 0.02, 0.02, c, Duration::ZERO)))
            .collect();
        let chain = TierChain::new("Projectile").add_tier(Box::new(ScriptedTier { script }));
        ProjectileDetector::with_chain(chain, 320)
    }

    #[test]
    fn colour_tier_locates_ball_patch() {
        let mut detector = ProjectileDetector::new(SearchMode::Standard, 320, None);
        let detection = run(&mut detector, ball_frame(160, 72), 0).unwrap();
        assert_eq!(detection.tier, DetectionTier::Heuristic);
        assert!((detection.bbox.x - 0.5).abs() < 0.02);
        assert!((detection.bbox.y - 0.3).abs() < 0.02);
        assert!(detection.bbox.confidence > 0.0);
        assert!(!detection.carried);
        assert_eq!(detection.trail.len(), 1);
    }

    #[test]
    fn colour_tier_finds_ball_in_downscaled_frames() {
        for (width, height) in [(640, 480), (1280, 720)] {
            let mut detector = ProjectileDetector::new(SearchMode::Standard, 320, None);
            let detection = run(&mut detector, sized_ball_frame(width, height), 0)
                .unwrap_or_else(|| panic!("no ball in {}x{} frame", width, height));
            assert_eq!(detection.tier, DetectionTier::Heuristic);
            assert!((detection.bbox.x - 0.5).abs() < 0.02);
            assert!((detection.bbox.y - 0.3).abs() < 0.02);
            assert!(detection.bbox.confidence > 0.0);

            let dark = RgbImage::from_pixel(width, height, Rgb(DARK));
            let held = run(&mut detector, dark.clone(), 900).expect("held within timeout");
            assert!(held.carried);
            assert!(run(&mut detector, dark, 1_901).is_none());
        }
    }

    #[test]
    fn confidence_is_boosted_once_when_smoothing() {
        let mut detector = ProjectileDetector::new(SearchMode::Standard, 320, None);
        let first = run(&mut detector, ball_frame(160, 72), 0).unwrap();
        // Single hit: the raw cluster score, 0.833 intensity factor times 0.725 colour confidence.
        assert!((first.bbox.confidence - 0.6046).abs() < 1e-3);

        let second = run(&mut detector, ball_frame(160, 72), 66).unwrap();
        assert!((second.bbox.confidence - first.bbox.confidence * CONFIDENCE_BOOST).abs() < 1e-5);
    }

    #[test]
    fn exhaustive_mode_also_finds_ball() {
        let mut detector = ProjectileDetector::new(SearchMode::Exhaustive, 320, None);
        let detection = run(&mut detector, ball_frame(100, 180), 0).unwrap();
        assert!((detection.bbox.x - 100.0 / 320.0).abs() < 0.02);
        assert!((detection.bbox.y - 0.75).abs() < 0.02);
    }

    #[test]
    fn elongated_streak_scores_below_ball() {
        let mut streak = dark_frame();
        for y in 70..74 {
            for x in 40..280 {
                streak.put_pixel(x, y, Rgb(BALL));
            }
        }
        let mut tier = ColorTier::new(SearchMode::Standard);
        let frame = Frame::new(streak, Duration::ZERO);
        let input = StageInput::new(&frame);
        let context = TierContext {
            input: &input,
            processed: frame.image(),
        };
        // 240 px long: elongated and outside the size band.
        assert!(tier.detect(&context).unwrap().is_none());
    }

    #[test]
    fn brightest_region_used_when_colour_fails() {
        let mut img = dark_frame();
        for y in 118..124 {
            for x in 158..164 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let mut detector = ProjectileDetector::new(SearchMode::Standard, 320, None);
        let detection = run(&mut detector, img, 0).unwrap();
        assert_eq!(detection.tier, DetectionTier::Fallback);
        assert_eq!(detection.bbox.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn smoothing_averages_and_extrapolates() {
        let mut detector = scripted(vec![
            Some((0.1, 0.5, 0.5)),
            Some((0.2, 0.5, 0.5)),
            Some((0.3, 0.5, 0.5)),
            Some((0.4, 0.5, 0.9)),
        ]);
        let first = run(&mut detector, dark_frame(), 0).unwrap();
        assert_eq!(first.bbox.x, 0.1);
        assert_eq!(first.bbox.confidence, 0.5);

        let second = run(&mut detector, dark_frame(), 66).unwrap();
        assert!((second.bbox.x - 0.15).abs() < 1e-6);
        assert!((second.bbox.confidence - 0.6).abs() < 1e-6);

        // Mean 0.2 plus 0.3 of a 0.1 step.
        let third = run(&mut detector, dark_frame(), 132).unwrap();
        assert!((third.bbox.x - 0.23).abs() < 1e-6);
        assert_eq!(third.trail.len(), 3);

        let fourth = run(&mut detector, dark_frame(), 198).unwrap();
        assert!(fourth.bbox.confidence <= CONFIDENCE_CEILING);
    }

    #[test]
    fn extrapolation_is_clamped_to_frame() {
        let mut detector = scripted(vec![
            Some((0.9, 0.5, 0.5)),
            Some((0.98, 0.5, 0.5)),
            Some((1.0, 0.5, 0.5)),
        ]);
        for ms in [0, 66] {
            run(&mut detector, dark_frame(), ms);
        }
        let third = run(&mut detector, dark_frame(), 132).unwrap();
        assert!(third.bbox.x <= 1.0);
    }

    #[test]
    fn detection_is_held_until_timeout_after_first_miss() {
        let mut detector = scripted(vec![
            Some((0.5, 0.5, 0.6)),
            Some((0.5, 0.5, 0.6)),
            None,
            None,
            None,
            None,
            None,
        ]);
        assert!(run(&mut detector, dark_frame(), 0).is_some());
        assert!(run(&mut detector, dark_frame(), 66).is_some());

        for ms in [132, 198, 264] {
            let held = run(&mut detector, dark_frame(), ms).unwrap();
            assert!(held.carried);
        }
        assert_eq!(detector.history_len(), 2);

        // Exactly one timeout after the first miss is still held.
        assert!(run(&mut detector, dark_frame(), 1132).is_some());
        assert!(run(&mut detector, dark_frame(), 1133).is_none());
        assert_eq!(detector.history_len(), 0);
        assert_eq!(detector.trail_len(), 0);
    }

    #[test]
    fn trail_drops_points_older_than_window() {
        let mut detector = scripted((0..20).map(|i| Some((0.05 * i as f32, 0.5, 0.6))).collect());
        let mut last = None;
        for i in 0..20u64 {
            last = run(&mut detector, dark_frame(), i * 100);
        }
        let trail = last.unwrap().trail;
        let newest = trail.last().unwrap().timestamp;
        assert!(trail.iter().all(|p| newest - p.timestamp <= TRAIL_WINDOW));
        assert_eq!(trail.len(), 11);
    }

    #[test]
    fn ball_sequence_is_held_then_dropped() {
        let mut detector = ProjectileDetector::new(SearchMode::Standard, 320, None);
        let step = 66;
        let mut t = 0;

        let first = run(&mut detector, ball_frame(160, 72), t).unwrap();
        assert!((first.bbox.x - 0.5).abs() < 0.02 && (first.bbox.y - 0.3).abs() < 0.02);
        assert!(first.bbox.confidence > 0.0);
        for _ in 0..5 {
            t += step;
            assert!(run(&mut detector, ball_frame(160, 72), t).is_some());
        }

        t += step;
        let disappeared = t;
        while t <= disappeared + 1_000 {
            let held = run(&mut detector, dark_frame(), t).expect("held within timeout");
            assert!((held.bbox.x - 0.5).abs() < 0.02 && (held.bbox.y - 0.3).abs() < 0.02);
            t += step;
        }
        assert!(run(&mut detector, dark_frame(), disappeared + 1_001).is_none());
        assert!(run(&mut detector, dark_frame(), disappeared + 1_100).is_none());
    }
}
