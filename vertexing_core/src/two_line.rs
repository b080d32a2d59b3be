//! Point-of-closest-approach vertexing for two straight lines.
//!
//! A cheap fallback when no covariance information is wanted: the vertex is
//! the midpoint of the shortest segment joining the lines.

use crate::straight_line::StraightLineTrack;
use crate::track::BilliorTrack;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Relative tolerance below which two directions count as parallel.
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// A line `point + s * direction`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub point: Vector3<f64>,
    pub direction: Vector3<f64>,
}

impl Line {
    pub fn new(point: Vector3<f64>, direction: Vector3<f64>) -> Self {
        Self { point, direction }
    }

    /// Tangent of a perigee track at its point of closest approach.
    pub fn from_track(track: &BilliorTrack) -> Self {
        let (sin_phi, cos_phi) = track.phi0().sin_cos();
        let (sin_theta, cos_theta) = track.theta().sin_cos();
        Self {
            point: Vector3::new(track.eps() * sin_phi, -track.eps() * cos_phi, track.z0()),
            direction: Vector3::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta),
        }
    }

    /// Line through a straight-line track's reference point.
    pub fn from_straight_line(track: &StraightLineTrack, x_ref: f64) -> Self {
        Self {
            point: track.position_at(x_ref, x_ref),
            direction: track.direction(),
        }
    }

    pub fn at(&self, s: f64) -> Vector3<f64> {
        self.point + self.direction * s
    }
}

/// Result of a two-line vertex search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoLineVertex {
    /// Midpoint of the shortest connecting segment
    pub position: Vector3<f64>,
    /// Length of the shortest connecting segment
    pub distance: f64,
    /// False when fewer than two lines were given or they are parallel
    pub is_valid: bool,
}

impl TwoLineVertex {
    fn invalid() -> Self {
        Self {
            position: Vector3::zeros(),
            distance: f64::INFINITY,
            is_valid: false,
        }
    }
}

/// Finds the point of closest approach of the first two lines.
pub fn fit_two_lines(lines: &[Line]) -> TwoLineVertex {
    let [first, second, ..] = lines else {
        return TwoLineVertex::invalid();
    };

    let w0 = first.point - second.point;
    let a = first.direction.norm_squared();
    let b = first.direction.dot(&second.direction);
    let c = second.direction.norm_squared();
    let d = first.direction.dot(&w0);
    let e = second.direction.dot(&w0);

    let denominator = a * c - b * b;
    if a == 0.0 || c == 0.0 || denominator <= PARALLEL_TOLERANCE * a * c {
        return TwoLineVertex::invalid();
    }

    let s = (b * e - c * d) / denominator;
    let t = (a * e - b * d) / denominator;
    let p1 = first.at(s);
    let p2 = second.at(t);

    TwoLineVertex {
        position: (p1 + p2) * 0.5,
        distance: (p1 - p2).norm(),
        is_valid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix5, Vector5};

    #[test]
    fn test_intersecting_lines() {
        let target = Vector3::new(3.0, -1.0, 2.0);
        let l1 = Line::new(target - Vector3::new(1.0, 0.2, 0.0) * 4.0, Vector3::new(1.0, 0.2, 0.0));
        let l2 = Line::new(target + Vector3::new(0.5, -1.0, 0.3) * 2.0, Vector3::new(0.5, -1.0, 0.3));
        let vertex = fit_two_lines(&[l1, l2]);
        assert!(vertex.is_valid);
        assert_relative_eq!(vertex.position, target, epsilon = 1e-12);
        assert_relative_eq!(vertex.distance, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_skew_lines_midpoint() {
        // x axis at z = 0 and y axis at z = 2
        let l1 = Line::new(Vector3::new(5.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let l2 = Line::new(Vector3::new(0.0, -3.0, 2.0), Vector3::new(0.0, 2.0, 0.0));
        let vertex = fit_two_lines(&[l1, l2]);
        assert!(vertex.is_valid);
        assert_relative_eq!(vertex.position, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        assert_relative_eq!(vertex.distance, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_and_missing_lines_invalid() {
        let l1 = Line::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 0.0));
        let l2 = Line::new(Vector3::new(0.0, 1.0, 0.0), Vector3::new(-2.0, -2.0, 0.0));
        assert!(!fit_two_lines(&[l1, l2]).is_valid);
        assert!(!fit_two_lines(&[l1]).is_valid);
        assert!(!fit_two_lines(&[]).is_valid);
        let degenerate = Line::new(Vector3::zeros(), Vector3::zeros());
        assert!(!fit_two_lines(&[l1, degenerate]).is_valid);
    }

    #[test]
    fn test_track_tangent_passes_through_perigee() {
        let track = BilliorTrack::new(Vector5::new(0.4, -0.2, 1.5, 0.3, 0.0), Matrix5::identity());
        let line = Line::from_track(&track);
        // transverse distance of the perigee point from the origin is |eps|
        assert_relative_eq!(line.point.xy().norm(), 0.4, epsilon = 1e-12);
        // and the direction is perpendicular to it in the transverse plane
        assert_relative_eq!(line.point.xy().dot(&line.direction.xy()), 0.0, epsilon = 1e-12);
        assert_relative_eq!(line.direction.norm(), 1.0, epsilon = 1e-12);
    }
}
