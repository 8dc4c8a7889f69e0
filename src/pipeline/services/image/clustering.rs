//! Distance-based grouping of candidate points.
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Upper bound on points considered by a single clustering pass.
pub const DEFAULT_MAX_POINTS: usize = 600;

/// A candidate point in processing-resolution pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl ScoredPoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self { x, y, score }
    }

    fn distance_sq(&self, other: &ScoredPoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// A connected group of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Score-weighted centroid, updated as points are absorbed.
    pub centroid: (f32, f32),
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub total_score: f32,
    /// Indices into the input slice.
    pub members: Vec<usize>,
    weight: f32,
}

impl Cluster {
    fn seed(index: usize, point: &ScoredPoint) -> Self {
        Self {
            centroid: (point.x, point.y),
            min_x: point.x,
            max_x: point.x,
            min_y: point.y,
            max_y: point.y,
            total_score: point.score,
            members: vec![index],
            weight: point_weight(point),
        }
    }

    fn absorb(&mut self, index: usize, point: &ScoredPoint) {
        let w = point_weight(point);
        let total = self.weight + w;
        self.centroid = (
            (self.centroid.0 * self.weight + point.x * w) / total,
            (self.centroid.1 * self.weight + point.y * w) / total,
        );
        self.weight = total;
        self.min_x = self.min_x.min(point.x);
        self.max_x = self.max_x.max(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_y = self.max_y.max(point.y);
        self.total_score += point.score;
        self.members.push(index);
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn average_score(&self) -> f32 {
        self.total_score / self.members.len() as f32
    }
}

fn point_weight(point: &ScoredPoint) -> f32 {
    point.score.max(1e-6)
}

/// Greedy O(n²) connected-by-distance clustering.
#[derive(Debug, Clone)]
pub struct SpatialClusterer {
    distance_threshold: f32,
    max_points: usize,
}

impl SpatialClusterer {
    pub fn new(distance_threshold: f32) -> Self {
        Self {
            distance_threshold,
            max_points: DEFAULT_MAX_POINTS,
        }
    }

    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(1);
        self
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Group points whose chain of neighbours lies within the threshold.
    ///
    /// Only the top `max_points` by score take part. The resulting cluster set
    /// does not depend on input order; clusters come back largest first.
    pub fn cluster(&self, points: &[ScoredPoint]) -> Vec<Cluster> {
        let candidates = self.select_candidates(points);
        let threshold_sq = self.distance_threshold * self.distance_threshold;
        let mut visited = vec![false; candidates.len()];
        let mut clusters = Vec::new();

        for start in 0..candidates.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;

            let seed_index = candidates[start];
            let mut cluster = Cluster::seed(seed_index, &points[seed_index]);
            let mut frontier = VecDeque::from([start]);

            while let Some(current) = frontier.pop_front() {
                let current_point = &points[candidates[current]];
                for other in 0..candidates.len() {
                    if visited[other] {
                        continue;
                    }
                    let other_point = &points[candidates[other]];
                    if current_point.distance_sq(other_point) <= threshold_sq {
                        visited[other] = true;
                        cluster.absorb(candidates[other], other_point);
                        frontier.push_back(other);
                    }
                }
            }

            clusters.push(cluster);
        }

        clusters.sort_by(|a, b| {
            b.count()
                .cmp(&a.count())
                .then_with(|| b.total_score.partial_cmp(&a.total_score).unwrap_or(Ordering::Equal))
        });
        clusters
    }

    /// Indices of the highest scoring points, in a canonical order.
    fn select_candidates(&self, points: &[ScoredPoint]) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        indices.sort_by(|&a, &b| {
            let (pa, pb) = (&points[a], &points[b]);
            pb.score
                .partial_cmp(&pa.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| pa.y.partial_cmp(&pb.y).unwrap_or(Ordering::Equal))
                .then_with(|| pa.x.partial_cmp(&pb.x).unwrap_or(Ordering::Equal))
        });
        indices.truncate(self.max_points);
        indices
    }
}
