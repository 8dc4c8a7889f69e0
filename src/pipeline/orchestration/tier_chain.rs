//! Ordered fallback across detection strategies.
use image::RgbImage;
use tracing::{debug, warn};

use super::stage::StageInput;
use crate::error::DetectionError;
use crate::pipeline::types::{DetectionBox, DetectionTier};

/// Inputs shared by every tier of a detector for one frame.
pub struct TierContext<'a> {
    pub input: &'a StageInput<'a>,
    /// The frame at processing resolution.
    pub processed: &'a RgbImage,
}

/// A single detection strategy with its own confidence gate.
pub trait DetectionStrategy: Send {
    fn tier(&self) -> DetectionTier;

    /// Results below this are treated as "not found" for this tier.
    fn min_confidence(&self) -> f32;

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierOutcome {
    pub detection: DetectionBox,
    pub tier: DetectionTier,
}

/// Tries strategies in order and returns the first that clears its own gate.
pub struct TierChain {
    entity: &'static str,
    tiers: Vec<Box<dyn DetectionStrategy>>,
}

impl TierChain {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            tiers: Vec::new(),
        }
    }

    pub fn add_tier(mut self, tier: Box<dyn DetectionStrategy>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn tiers(&self) -> Vec<DetectionTier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub fn select(&mut self, context: &TierContext<'_>) -> Option<TierOutcome> {
        for strategy in &mut self.tiers {
            match strategy.detect(context) {
                Ok(Some(detection)) if detection.confidence >= strategy.min_confidence() => {
                    debug!(
                        "{} found by {} tier (confidence {:.2})",
                        self.entity,
                        strategy.tier().label(),
                        detection.confidence
                    );
                    return Some(TierOutcome {
                        detection,
                        tier: strategy.tier(),
                    });
                }
                Ok(Some(detection)) => {
                    debug!(
                        "{} {} tier below gate ({:.2} < {:.2})",
                        self.entity,
                        strategy.tier().label(),
                        detection.confidence,
                        strategy.min_confidence()
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "{} {} tier failed, falling back: {}",
                        self.entity,
                        strategy.tier().label(),
                        e
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Frame;
    use std::time::Duration;

    struct FixedTier {
        tier: DetectionTier,
        gate: f32,
        confidence: Option<f32>,
        fail: bool,
    }

    impl DetectionStrategy for FixedTier {
        fn tier(&self) -> DetectionTier {
            self.tier
        }

        fn min_confidence(&self) -> f32 {
            self.gate
        }

        fn detect(&mut self, _context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
            if self.fail {
                return Err(DetectionError::InvalidInput("bad tensor".to_string()));
            }
            Ok(self
                .confidence
                .map(|c| DetectionBox::new(0.5, 0.5, 0.1, 0.1, c, Duration::ZERO)))
        }
    }

    fn tier(tier: DetectionTier, gate: f32, confidence: Option<f32>, fail: bool) -> Box<FixedTier> {
        Box::new(FixedTier {
            tier,
            gate,
            confidence,
            fail,
        })
    }

    fn run(chain: &mut TierChain) -> Option<TierOutcome> {
        let frame = Frame::new(RgbImage::new(8, 8), Duration::ZERO);
        let input = StageInput::new(&frame);
        let context = TierContext {
            input: &input,
            processed: frame.image(),
        };
        chain.select(&context)
    }

    #[test]
    fn highest_tier_meeting_gate_wins() {
        let mut chain = TierChain::new("test")
            .add_tier(tier(DetectionTier::Inference, 0.5, Some(0.9), false))
            .add_tier(tier(DetectionTier::Heuristic, 0.3, Some(0.95), false));
        assert_eq!(run(&mut chain).unwrap().tier, DetectionTier::Inference);
    }

    #[test]
    fn lower_tier_used_when_higher_is_below_gate_or_failing() {
        let mut chain = TierChain::new("test")
            .add_tier(tier(DetectionTier::Inference, 0.5, None, true))
            .add_tier(tier(DetectionTier::Geometric, 0.5, Some(0.4), false))
            .add_tier(tier(DetectionTier::Heuristic, 0.3, Some(0.35), false));
        let outcome = run(&mut chain).unwrap();
        assert_eq!(outcome.tier, DetectionTier::Heuristic);
        assert_eq!(outcome.detection.confidence, 0.35);
    }

    #[test]
    fn nothing_when_every_tier_misses() {
        let mut chain = TierChain::new("test")
            .add_tier(tier(DetectionTier::Inference, 0.5, None, false))
            .add_tier(tier(DetectionTier::Fallback, 0.1, Some(0.05), false));
        assert!(run(&mut chain).is_none());
    }
}
