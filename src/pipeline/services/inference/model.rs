//! One-shot asynchronous model loading with an explicit lifecycle.
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::tensor::Tensor;
use crate::config::InferenceSettings;
use crate::error::InferenceError;

/// A loaded model that can be run on a preprocessed input.
pub trait InferenceSession: Send + Sync {
    /// `input` is `[1, 3, edge, edge]`; output is `[1, 4 + classes, anchors]`.
    fn run(&self, input: &Tensor) -> Result<Tensor, InferenceError>;
}

/// Loads a model file into a session.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn InferenceSession>, InferenceError>;
}

#[derive(Clone)]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready(Arc<dyn InferenceSession>),
    Failed(InferenceError),
    Released,
}

impl fmt::Debug for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelState::Unloaded => write!(f, "Unloaded"),
            ModelState::Loading => write!(f, "Loading"),
            ModelState::Ready(_) => write!(f, "Ready"),
            ModelState::Failed(e) => write!(f, "Failed({})", e),
            ModelState::Released => write!(f, "Released"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
    Released,
}

/// Shared handle to the inference model. Clones observe the same lifecycle.
#[derive(Clone)]
pub struct ModelHandle {
    state: Arc<Mutex<ModelState>>,
    model_path: PathBuf,
    input_edge: u32,
    num_classes: usize,
}

impl ModelHandle {
    pub fn new(model_path: impl Into<PathBuf>, input_edge: u32, num_classes: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModelState::Unloaded)),
            model_path: model_path.into(),
            input_edge,
            num_classes,
        }
    }

    /// `None` when no model path is configured.
    pub fn from_settings(settings: &InferenceSettings) -> Option<Self> {
        settings
            .model_path
            .as_ref()
            .map(|path| Self::new(path.clone(), settings.input_edge, settings.num_classes))
    }

    fn lock(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> ModelStatus {
        match *self.lock() {
            ModelState::Unloaded => ModelStatus::Unloaded,
            ModelState::Loading => ModelStatus::Loading,
            ModelState::Ready(_) => ModelStatus::Ready,
            ModelState::Failed(_) => ModelStatus::Failed,
            ModelState::Released => ModelStatus::Released,
        }
    }

    pub fn state(&self) -> ModelState {
        self.lock().clone()
    }

    /// Start loading in the background. Only the first call from `Unloaded` does anything.
    pub fn begin_load(&self, loader: Arc<dyn ModelLoader>, timeout: Duration) -> Option<JoinHandle<()>> {
        {
            let mut state = self.lock();
            if !matches!(*state, ModelState::Unloaded) {
                return None;
            }
            *state = ModelState::Loading;
        }

        let handle = self.clone();
        Some(tokio::spawn(async move {
            let path = handle.model_path.clone();
            let outcome = match tokio::time::timeout(timeout, loader.load(&path)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::LoadTimeout(timeout)),
            };

            let mut state = handle.lock();
            if matches!(*state, ModelState::Released) {
                info!("Model {} finished loading after release, discarding", path.display());
                return;
            }
            *state = match outcome {
                Ok(session) => {
                    info!("Model {} ready", path.display());
                    ModelState::Ready(session)
                }
                Err(e) => {
                    warn!("Model unavailable, using fallback tiers: {}", e);
                    ModelState::Failed(e)
                }
            };
        }))
    }

    /// The session, only while `Ready`.
    pub fn session(&self) -> Option<Arc<dyn InferenceSession>> {
        match &*self.lock() {
            ModelState::Ready(session) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Drop the session. Returns true only for the call that released it.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, ModelState::Released) {
            return false;
        }
        *state = ModelState::Released;
        info!("Released model {}", self.model_path.display());
        true
    }

    pub fn input_edge(&self) -> u32 {
        self.input_edge
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
