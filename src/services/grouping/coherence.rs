use geo::{Area, ConvexHull, MultiPoint, Point};

use super::geometry::planar_distance;
use super::types::{GroupingParameters, PlotRecord};

/// Below this size every pair is compared directly.
const HULL_MIN_POINTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoherenceVerdict {
    Coherent { diameter: f64 },
    TooSpreadOut { diameter: f64 },
}

impl CoherenceVerdict {
    pub fn is_coherent(&self) -> bool {
        matches!(self, CoherenceVerdict::Coherent { .. })
    }
}

fn max_pairwise_distance(points: &[Point<f64>]) -> f64 {
    let mut best = 0.0_f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            best = best.max(planar_distance(*a, *b));
        }
    }
    best
}

/// Exact maximum pairwise distance. The farthest pair always lies on the convex hull, so large
/// sets only compare hull vertices.
pub fn point_set_diameter(points: &[Point<f64>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    if points.len() < HULL_MIN_POINTS {
        return max_pairwise_distance(points);
    }
    let hull = MultiPoint::new(points.to_vec()).convex_hull();
    if hull.unsigned_area() <= 0.0 {
        return max_pairwise_distance(points);
    }
    let vertices: Vec<Point<f64>> = hull.exterior().points().collect();
    max_pairwise_distance(&vertices)
}

pub fn evaluate_cluster(
    plots: &[PlotRecord],
    members: &[usize],
    params: &GroupingParameters,
) -> CoherenceVerdict {
    let centroids: Vec<Point<f64>> = members.iter().map(|&idx| plots[idx].centroid).collect();
    let diameter = point_set_diameter(&centroids);
    if diameter > 2.0 * params.proximity_threshold {
        CoherenceVerdict::TooSpreadOut { diameter }
    } else {
        CoherenceVerdict::Coherent { diameter }
    }
}
