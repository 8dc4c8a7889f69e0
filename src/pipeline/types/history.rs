use std::collections::VecDeque;
use std::time::Duration;

use super::detection::{DetectionBox, TrailPoint};

/// Fixed-capacity ring of recent detections owned by a single detector.
#[derive(Debug, Clone)]
pub struct DetectionHistory {
    entries: VecDeque<DetectionBox>,
    capacity: usize,
}

impl DetectionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, detection: DetectionBox) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(detection);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn latest(&self) -> Option<&DetectionBox> {
        self.entries.back()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &DetectionBox> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    /// Field-wise arithmetic mean over all stored entries; timestamp of the latest.
    pub fn mean(&self) -> Option<DetectionBox> {
        let latest = self.entries.back()?;
        let n = self.entries.len() as f32;
        let (mut x, mut y, mut w, mut h, mut c) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for entry in &self.entries {
            x += entry.x;
            y += entry.y;
            w += entry.width;
            h += entry.height;
            c += entry.confidence;
        }
        Some(DetectionBox::new(
            x / n,
            y / n,
            w / n,
            h / n,
            c / n,
            latest.timestamp,
        ))
    }
}

/// Time-windowed sequence of prior projectile positions.
#[derive(Debug, Clone)]
pub struct MotionTrail {
    points: VecDeque<TrailPoint>,
    window: Duration,
}

impl MotionTrail {
    pub fn new(window: Duration) -> Self {
        Self {
            points: VecDeque::new(),
            window,
        }
    }

    /// Drop entries older than the window, then append.
    pub fn record(&mut self, point: TrailPoint) {
        self.evict_before(point.timestamp);
        self.points.push_back(point);
    }

    pub fn evict_before(&mut self, now: Duration) {
        let cutoff = now.saturating_sub(self.window);
        while let Some(front) = self.points.front() {
            if front.timestamp < cutoff {
                self.points.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn points(&self) -> Vec<TrailPoint> {
        self.points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
