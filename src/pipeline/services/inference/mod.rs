pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pose_estimator;
pub mod tensor;

pub use model::{InferenceSession, ModelHandle, ModelLoader, ModelState, ModelStatus};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxLoader, OnnxSession};
pub use pose_estimator::PoseEstimator;
pub use tensor::{decode_best, preprocess, preprocess_into, RawBox, Tensor};
