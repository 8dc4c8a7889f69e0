//! Frame source that replays a directory of still images at a fixed rate.
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::common::{Frame, FrameSource, SourceState};
use crate::error::AppError;

const SUPPORTED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    frame_interval: Duration,
    position: usize,
    paused: bool,
    dimensions: (u32, u32),
}

impl ImageSequenceSource {
    /// Collect the image files of `dir` in lexical order.
    pub fn open(dir: &Path, fps: u32) -> Result<Self, AppError> {
        if fps == 0 {
            return Err(AppError::Source("Replay fps must be greater than 0".to_string()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| AppError::Source(format!("No images found in {}", dir.display())))?;
        let dimensions = image::image_dimensions(first)?;
        debug!("Opened {} frames from {}", paths.len(), dir.display());

        Ok(Self {
            paths,
            frame_interval: Duration::from_secs_f64(1.0 / fps as f64),
            position: 0,
            paused: false,
            dimensions,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn current_time(&self) -> Duration {
        self.frame_interval * self.position as u32
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.frame_interval * self.paths.len() as u32)
    }

    fn state(&self) -> SourceState {
        if self.position >= self.paths.len() {
            SourceState::Ended
        } else if self.paused {
            SourceState::Paused
        } else {
            SourceState::Ready
        }
    }

    fn capture(&mut self) -> Option<Frame> {
        if self.state() != SourceState::Ready {
            return None;
        }

        let timestamp = self.current_time();
        let path = &self.paths[self.position];
        self.position += 1;

        match image::open(path) {
            Ok(image) => Some(Frame::new(image.to_rgb8(), timestamp)),
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", path.display(), e);
                None
            }
        }
    }

    fn play(&mut self) {
        self.paused = false;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn seek(&mut self, position: Duration) {
        let index = (position.as_secs_f64() / self.frame_interval.as_secs_f64()).floor() as usize;
        self.position = index.min(self.paths.len());
    }
}
