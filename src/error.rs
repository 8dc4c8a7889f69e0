use std::time::Duration;

use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Frame source error: {0}")]
    Source(String),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    #[error("Analysis loop was cancelled")]
    Cancelled,
    #[error("Analysis task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// Inference capability Error Type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Failed to load model {path}: {reason}")]
    LoadFailed { path: String, reason: String },
    #[error("Model load timed out after {0:?}")]
    LoadTimeout(Duration),
    #[error("Model is not ready")]
    NotReady,
    #[error("Inference run failed: {0}")]
    RunFailed(String),
    #[error("Unexpected output shape {actual:?}, expected [1, {expected_channels}, N]")]
    MalformedOutput {
        actual: Vec<usize>,
        expected_channels: usize,
    },
}

// Per-frame detection Error Type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Frame has zero dimensions ({0}x{1})")]
    EmptyFrame(u32, u32),
    #[error("Invalid stage input: {0}")]
    InvalidInput(String),
}
