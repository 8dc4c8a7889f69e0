use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::pipeline::types::{CameraAngle, Handedness};

/// Top-level runtime configuration.
///
/// Loaded from an optional file, then `SERVE_VISION__*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub log_level: String,
    pub analysis: AnalysisSettings,
    pub throttle: ThrottleSettings,
    pub inference: InferenceSettings,
    pub projectile: ProjectileSettings,
    pub status: StatusSettings,
    pub sink: SinkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Scheduling cadence of the cooperative loop.
    pub target_fps: u32,
    pub handedness: Handedness,
    pub camera_angle: CameraAngle,
    /// Frames wider than this are downscaled before pixel heuristics run.
    pub processing_width: u32,
    pub frame_buffer_size: usize,
}

/// Minimum interval between invocations of each stage, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleSettings {
    pub pose_interval_ms: u64,
    pub implement_interval_ms: u64,
    pub projectile_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub model_path: Option<PathBuf>,
    pub input_edge: u32,
    pub implement_class: usize,
    pub projectile_class: usize,
    pub num_classes: usize,
    pub load_timeout_ms: u64,
    /// Minimum class score for an anchor to count as a detection.
    pub score_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Standard,
    Exhaustive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectileSettings {
    pub search_mode: SearchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// How long an entity must be missing before a persistent message is shown.
    pub absence_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub output_dir: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            analysis: AnalysisSettings::default(),
            throttle: ThrottleSettings::default(),
            inference: InferenceSettings::default(),
            projectile: ProjectileSettings::default(),
            status: StatusSettings::default(),
            sink: SinkSettings::default(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            target_fps: 15,
            handedness: Handedness::Right,
            camera_angle: CameraAngle::Side,
            processing_width: 320,
            frame_buffer_size: 30,
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            pose_interval_ms: 50,        // ~20 Hz
            implement_interval_ms: 100,  // ~10 Hz
            projectile_interval_ms: 66,  // ~15 Hz
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            input_edge: 416,
            implement_class: 0,
            projectile_class: 1,
            num_classes: 2,
            load_timeout_ms: 10_000,
            score_threshold: 0.5,
        }
    }
}

impl Default for ProjectileSettings {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Standard,
        }
    }
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            absence_window_ms: 3_000,
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sessions"),
        }
    }
}

impl ThrottleSettings {
    pub fn pose_interval(&self) -> Duration {
        Duration::from_millis(self.pose_interval_ms)
    }

    pub fn implement_interval(&self) -> Duration {
        Duration::from_millis(self.implement_interval_ms)
    }

    pub fn projectile_interval(&self) -> Duration {
        Duration::from_millis(self.projectile_interval_ms)
    }
}

impl Configuration {
    /// Build the configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let configuration: Configuration = builder
            .add_source(Environment::with_prefix("SERVE_VISION").separator("__"))
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), AppError> {
        if self.analysis.target_fps == 0 {
            return Err(AppError::InvalidConfig(
                "Target fps must be greater than 0".to_string(),
            ));
        }

        if self.analysis.processing_width == 0 {
            return Err(AppError::InvalidConfig(
                "Processing width must be greater than 0".to_string(),
            ));
        }

        if self.inference.input_edge == 0 {
            return Err(AppError::InvalidConfig(
                "Inference input edge must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.inference.score_threshold) {
            return Err(AppError::InvalidConfig(format!(
                "Score threshold {} must be within [0, 1]",
                self.inference.score_threshold
            )));
        }

        let max_class = self.inference.implement_class.max(self.inference.projectile_class);
        if max_class >= self.inference.num_classes {
            return Err(AppError::InvalidConfig(format!(
                "Class index {} out of range for {} classes",
                max_class, self.inference.num_classes
            )));
        }

        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.analysis.target_fps as f64)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.inference.load_timeout_ms)
    }

    pub fn absence_window(&self) -> Duration {
        Duration::from_millis(self.status.absence_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let configuration = Configuration::default();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.inference.input_edge, 416);
        assert_eq!(configuration.frame_interval(), Duration::from_secs_f64(1.0 / 15.0));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut configuration = Configuration::default();
        configuration.analysis.target_fps = 0;
        assert!(matches!(
            configuration.validate(),
            Err(AppError::InvalidConfig(_))
        ));
    }

    #[test]
    fn class_index_must_fit_class_count() {
        let mut configuration = Configuration::default();
        configuration.inference.projectile_class = 5;
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let configuration = Configuration::load(None).expect("defaults should load");
        assert_eq!(configuration.throttle.implement_interval_ms, 100);
        assert_eq!(configuration.projectile.search_mode, SearchMode::Standard);
    }
}
