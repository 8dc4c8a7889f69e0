//! Which tier is tracking each entity, and sustained-absence messages.
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::pipeline::types::{DetectionTier, ImplementDetection, Pose, PoseSource, ProjectileDetection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackedEntity {
    Pose,
    Implement,
    Projectile,
}

impl TrackedEntity {
    pub fn label(&self) -> &'static str {
        match self {
            TrackedEntity::Pose => "pose",
            TrackedEntity::Implement => "implement",
            TrackedEntity::Projectile => "projectile",
        }
    }
}

/// Status indicator content for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusReport {
    pub pose_source: Option<PoseSource>,
    pub implement_tier: Option<DetectionTier>,
    pub projectile_tier: Option<DetectionTier>,
    /// Persistent messages, one per entity missing for longer than the absence window.
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Track {
    last_seen: Option<Duration>,
    reported: bool,
}

impl Track {
    /// Returns the absence duration once it exceeds `window`.
    fn observe(&mut self, seen: bool, now: Duration, since: Duration, window: Duration) -> Option<Duration> {
        if seen {
            self.last_seen = Some(now);
            self.reported = false;
            return None;
        }
        let missing = now.saturating_sub(self.last_seen.unwrap_or(since));
        (missing >= window).then_some(missing)
    }
}

pub struct TrackingStatus {
    absence_window: Duration,
    started: Option<Duration>,
    pose: Track,
    implement: Track,
    projectile: Track,
}

impl TrackingStatus {
    pub fn new(absence_window: Duration) -> Self {
        Self {
            absence_window,
            started: None,
            pose: Track::default(),
            implement: Track::default(),
            projectile: Track::default(),
        }
    }

    /// Fold this frame's outputs in. Held-over projectile values do not count as seen.
    pub fn update(
        &mut self,
        now: Duration,
        pose: Option<&Pose>,
        implement: Option<&ImplementDetection>,
        projectile: Option<&ProjectileDetection>,
    ) -> StatusReport {
        let since = *self.started.get_or_insert(now);
        let window = self.absence_window;

        let mut messages = Vec::new();
        let entities = [
            (TrackedEntity::Pose, &mut self.pose, pose.is_some()),
            (TrackedEntity::Implement, &mut self.implement, implement.is_some()),
            (
                TrackedEntity::Projectile,
                &mut self.projectile,
                projectile.map(|p| !p.carried).unwrap_or(false),
            ),
        ];
        for (entity, track, seen) in entities {
            if let Some(missing) = track.observe(seen, now, since, window) {
                if !track.reported {
                    info!("{} not detected for {:.1}s", entity.label(), missing.as_secs_f32());
                    track.reported = true;
                }
                messages.push(format!(
                    "{} not detected for {:.1}s",
                    entity.label(),
                    missing.as_secs_f32()
                ));
            }
        }

        StatusReport {
            pose_source: pose.map(|p| p.source),
            implement_tier: implement.map(|i| i.tier),
            projectile_tier: projectile.map(|p| p.tier),
            messages,
        }
    }

    pub fn reset(&mut self) {
        self.started = None;
        self.pose = Track::default();
        self.implement = Track::default();
        self.projectile = Track::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::DetectionBox;

    fn projectile(carried: bool) -> ProjectileDetection {
        ProjectileDetection {
            bbox: DetectionBox::new(0.5, 0.5, 0.02, 0.02, 0.7, Duration::ZERO),
            tier: DetectionTier::Heuristic,
            trail: Vec::new(),
            carried,
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn transient_misses_produce_no_message() {
        let mut status = TrackingStatus::new(ms(3_000));
        let seen = projectile(false);
        status.update(ms(0), None, None, Some(&seen));
        let report = status.update(ms(500), None, None, None);
        assert!(!report.messages.iter().any(|m| m.starts_with("projectile")));
    }

    #[test]
    fn sustained_absence_is_reported() {
        let mut status = TrackingStatus::new(ms(3_000));
        let seen = projectile(false);
        status.update(ms(0), None, None, Some(&seen));
        let report = status.update(ms(3_000), None, None, None);
        assert!(report
            .messages
            .contains(&"projectile not detected for 3.0s".to_string()));
        assert!(report.messages.contains(&"pose not detected for 3.0s".to_string()));
    }

    #[test]
    fn carried_projectile_counts_as_missing() {
        let mut status = TrackingStatus::new(ms(1_000));
        let held = projectile(true);
        status.update(ms(0), None, None, Some(&projectile(false)));
        let report = status.update(ms(1_500), None, None, Some(&held));
        assert_eq!(report.projectile_tier, Some(DetectionTier::Heuristic));
        assert!(report.messages.iter().any(|m| m.starts_with("projectile")));
    }

    #[test]
    fn redetection_clears_message() {
        let mut status = TrackingStatus::new(ms(1_000));
        status.update(ms(0), None, None, None);
        assert!(!status.update(ms(2_000), None, None, None).messages.is_empty());
        let seen = projectile(false);
        let report = status.update(ms(2_100), None, None, Some(&seen));
        assert!(!report.messages.iter().any(|m| m.starts_with("projectile")));
    }
}
