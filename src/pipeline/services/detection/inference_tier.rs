use ndarray::IxDyn;
use tracing::trace;

use crate::error::DetectionError;
use crate::pipeline::orchestration::{DetectionStrategy, TierContext};
use crate::pipeline::services::inference::{decode_best, preprocess_into, ModelHandle, Tensor};
use crate::pipeline::types::{DetectionBox, DetectionTier};

/// Model-backed tier. Reports nothing until the shared model is ready.
pub struct InferenceTier {
    model: ModelHandle,
    class_index: usize,
    score_threshold: f32,
    // Reused between frames; resized on the first run.
    input: Tensor,
}

impl InferenceTier {
    pub fn new(model: ModelHandle, class_index: usize, score_threshold: f32) -> Self {
        Self {
            model,
            class_index,
            score_threshold,
            input: Tensor::zeros(IxDyn(&[0])),
        }
    }
}

impl DetectionStrategy for InferenceTier {
    fn tier(&self) -> DetectionTier {
        DetectionTier::Inference
    }

    fn min_confidence(&self) -> f32 {
        self.score_threshold
    }

    fn detect(&mut self, context: &TierContext<'_>) -> Result<Option<DetectionBox>, DetectionError> {
        let Some(session) = self.model.session() else {
            trace!("Model not ready ({:?}), skipping inference tier", self.model.status());
            return Ok(None);
        };

        let edge = self.model.input_edge();
        let frame = context.input.frame;
        preprocess_into(frame.image(), edge, &mut self.input);
        let output = session.run(&self.input)?;
        let best = decode_best(&output, self.model.num_classes(), self.class_index, self.score_threshold)?;

        let scale = edge as f32;
        Ok(best.map(|raw| {
            DetectionBox::new(
                (raw.cx / scale).clamp(0.0, 1.0),
                (raw.cy / scale).clamp(0.0, 1.0),
                (raw.width / scale).clamp(0.0, 1.0),
                (raw.height / scale).clamp(0.0, 1.0),
                raw.score.clamp(0.0, 1.0),
                frame.timestamp(),
            )
        }))
    }
}
