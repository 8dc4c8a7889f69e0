use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::pipeline::types::{CameraAngle, ServeMetrics, ServePhase};

pub mod json_sink;

pub use json_sink::JsonFileSink;

/// Persisted summary of one analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub camera_angle: CameraAngle,
    pub final_metrics: ServeMetrics,
    pub final_similarity: f32,
    pub final_phase: ServePhase,
    pub metrics_history: Vec<ServeMetrics>,
    /// Span between the first and last processed frame timestamps.
    pub duration_estimate: Duration,
}

/// Destination for finished session snapshots.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store the snapshot and return where it ended up.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<PathBuf, AppError>;
}
