//! Tracking and detector frames.
//!
//! The fitter works in the tracking frame: axis 0 runs along the beam and
//! axis 2 along the dipole field. Detector coordinates put the beam on `z`:
//! `(x, y, z)_det = (t1, t2, t0)`.

use nalgebra::{Matrix3, Vector3};

/// Rotation `R` with `v_det = R * v_trk`.
pub fn tracking_to_detector() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,
        1.0, 0.0, 0.0,
    )
}

/// Maps a tracking-frame vector into detector coordinates.
pub fn to_detector(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v[1], v[2], v[0])
}

/// Maps a detector-frame vector into tracking coordinates.
pub fn to_tracking(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v[2], v[0], v[1])
}

/// Rotates a tracking-frame covariance into detector coordinates.
pub fn covariance_to_detector(cov: &Matrix3<f64>) -> Matrix3<f64> {
    let r = tracking_to_detector();
    r * cov * r.transpose()
}

/// Rotates a detector-frame covariance into tracking coordinates.
pub fn covariance_to_tracking(cov: &Matrix3<f64>) -> Matrix3<f64> {
    let r = tracking_to_detector();
    r.transpose() * cov * r
}
