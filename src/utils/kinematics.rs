//! Motion features derived from an ordered trajectory
use itertools::Itertools;

use crate::utils::{euclidean_distance, Point};

/// Total length of the polyline through `points`
pub fn path_length(points: &[Point]) -> f32 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| euclidean_distance(a, b))
        .sum()
}

/// Average linear speed: path length divided by the number of points.
///
/// Basic usage:
///
/// ```
/// use fauna_rs::utils::{linear_velocity, Point};
/// let v = linear_velocity(&[Point::new(0.0, 0.0), Point::new(3.0, 4.0)]);
/// assert_eq!(v, 2.5);
/// ```
pub fn linear_velocity(points: &[Point]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    path_length(points) / points.len() as f32
}

/// Turning angle at `p2` in degrees: 0 for a straight line, 180 for a full reversal.
/// Degenerate triangles (any side of zero length) give 0.
pub fn turning_angle(p1: &Point, p2: &Point, p3: &Point) -> f32 {
    let c = distance_f64(p2, p1);
    let a = distance_f64(p2, p3);
    let b = distance_f64(p1, p3);
    let denominator = 2.0 * a * c;
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    let cos_b = ((a * a + c * c - b * b) / denominator).clamp(-1.0, 1.0);
    // Interior angle is kept to 1/100 of a degree
    let interior = (cos_b.acos().to_degrees() * 100.0).round() / 100.0;
    (180.0 - interior) as f32
}

// Side lengths in double precision, otherwise collinear triplets drift away from 180 degrees
fn distance_f64(p: &Point, q: &Point) -> f64 {
    let dx = p.x as f64 - q.x as f64;
    let dy = p.y as f64 - q.y as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Average turning rate over every consecutive triplet of points
pub fn angular_velocity(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let angles: Vec<f32> = points
        .iter()
        .tuple_windows()
        .map(|(p1, p2, p3)| turning_angle(p1, p2, p3))
        .collect();
    angles.iter().sum::<f32>() / angles.len() as f32
}

/// Cumulative distance and average speed after each step of the trajectory.
/// Both vectors have `points.len() - 1` entries.
pub fn speed_profile(points: &[Point]) -> (Vec<f32>, Vec<f32>) {
    let mut speeds = Vec::with_capacity(points.len().saturating_sub(1));
    let mut distances: Vec<f32> = Vec::with_capacity(points.len().saturating_sub(1));
    for (step, (a, b)) in points.iter().tuple_windows().enumerate() {
        let walked = distances.last().copied().unwrap_or(0.0) + euclidean_distance(a, b);
        distances.push(walked);
        speeds.push(walked / (step + 1) as f32);
    }
    (speeds, distances)
}
