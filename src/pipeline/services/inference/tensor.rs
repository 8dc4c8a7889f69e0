use image::RgbImage;
use ndarray::{ArrayD, Ix3, IxDyn};

use crate::error::InferenceError;

/// Dynamic-rank f32 tensor exchanged with inference sessions.
pub type Tensor = ArrayD<f32>;

fn input_shape(edge: u32) -> [usize; 4] {
    let edge = edge as usize;
    [1, 3, edge, edge]
}

/// Stretch-resize to `edge x edge` and lay out as `[1, 3, edge, edge]` in [0, 1].
pub fn preprocess(image: &RgbImage, edge: u32) -> Tensor {
    let mut tensor = Tensor::zeros(IxDyn(&input_shape(edge)));
    preprocess_into(image, edge, &mut tensor);
    tensor
}

/// Same as [`preprocess`], writing into `tensor`. The buffer is only
/// reallocated when its shape does not match `edge`.
pub fn preprocess_into(image: &RgbImage, edge: u32, tensor: &mut Tensor) {
    let shape = input_shape(edge);
    if tensor.shape() != shape.as_slice() {
        *tensor = Tensor::zeros(IxDyn(&shape));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        tensor.fill(0.0);
        return;
    }

    let edge = edge as u64;
    for ty in 0..edge {
        let sy = (ty * height as u64 / edge) as u32;
        for tx in 0..edge {
            let sx = (tx * width as u64 / edge) as u32;
            let pixel = image.get_pixel(sx, sy);
            for channel in 0..3 {
                tensor[[0, channel, ty as usize, tx as usize]] = pixel[channel] as f32 / 255.0;
            }
        }
    }
}

/// Best box of one class in input-pixel space (centre + size).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

/// Pick the highest scoring anchor for `class_index` from a
/// `[1, 4 + num_classes, anchors]` output.
pub fn decode_best(
    output: &Tensor,
    num_classes: usize,
    class_index: usize,
    threshold: f32,
) -> Result<Option<RawBox>, InferenceError> {
    let expected_channels = 4 + num_classes;
    let malformed = || InferenceError::MalformedOutput {
        actual: output.shape().to_vec(),
        expected_channels,
    };

    let view = output.view().into_dimensionality::<Ix3>().map_err(|_| malformed())?;
    let (batch, channels, anchors) = view.dim();
    if batch != 1 || channels != expected_channels || class_index >= num_classes {
        return Err(malformed());
    }

    let score_row = 4 + class_index;
    let mut best: Option<RawBox> = None;
    for anchor in 0..anchors {
        let score = view[[0, score_row, anchor]];
        if score < threshold || best.map(|b| score <= b.score).unwrap_or(false) {
            continue;
        }
        best = Some(RawBox {
            cx: view[[0, 0, anchor]],
            cy: view[[0, 1, anchor]],
            width: view[[0, 2, anchor]],
            height: view[[0, 3, anchor]],
            score,
        });
    }
    Ok(best)
}
