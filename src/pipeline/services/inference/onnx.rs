//! ONNX Runtime backed model loading, enabled with the `onnx` feature.
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info};

use super::model::{InferenceSession, ModelLoader};
use super::tensor::Tensor;
use crate::error::InferenceError;

/// Loads `.onnx` files into CPU sessions on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxLoader;

#[async_trait]
impl ModelLoader for OnnxLoader {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn InferenceSession>, InferenceError> {
        let path = model_path.to_path_buf();
        let session = tokio::task::spawn_blocking(move || OnnxSession::open(&path))
            .await
            .map_err(|e| load_failed(model_path, e))??;
        Ok(Arc::new(session))
    }
}

/// A committed ONNX Runtime session. Runs are serialised through the lock.
pub struct OnnxSession {
    session: Mutex<Session>,
}

impl OnnxSession {
    pub fn open(model_path: &Path) -> Result<Self, InferenceError> {
        info!("Loading ONNX model {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| load_failed(model_path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_failed(model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| load_failed(model_path, e))?;
        debug!("ONNX model {} committed", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceSession for OnnxSession {
    fn run(&self, input: &Tensor) -> Result<Tensor, InferenceError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::RunFailed("Session lock poisoned".to_string()))?;
        let tensor_ref = TensorRef::from_array_view(input).map_err(run_failed)?;
        let outputs = session.run(ort::inputs![tensor_ref]).map_err(run_failed)?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(run_failed)?
            .into_owned();
        Ok(output)
    }
}

fn load_failed(model_path: &Path, error: impl Display) -> InferenceError {
    InferenceError::LoadFailed {
        path: model_path.display().to_string(),
        reason: error.to_string(),
    }
}

fn run_failed(error: impl Display) -> InferenceError {
    InferenceError::RunFailed(error.to_string())
}
