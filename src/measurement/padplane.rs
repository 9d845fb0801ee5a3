//! Pad-plane measurement: two coordinates across the drift direction.
//!
//! In a TPC the pad coordinates come straight from the readout geometry while
//! the drift coordinate is reconstructed from timing and depends on the drift
//! velocity calibration. Segments registered as pad planes let the fit ignore
//! the drift coordinate entirely.

use nalgebra::{Matrix2, Vector2};

use super::Axis;
use crate::{Matrix3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub struct PadPlane {
    pub detector_id: i32,
    /// Measured coordinates along the two axes orthogonal to `drift_axis`,
    /// in increasing axis order (cm).
    pub coordinates: Vector2<f64>,
    /// Covariance of `coordinates` (cm²).
    pub covariance: Matrix2<f64>,
    pub drift_axis: Axis,
    /// Unused by the fit; kept so the hit can be placed in 3-D for seeding.
    pub drift_coordinate: f64,
}

impl PadPlane {
    /// Build from a 3-D position and covariance by dropping the drift axis.
    pub fn from_spatial(detector_id: i32, position: &Vector3, covariance: &Matrix3, drift_axis: Axis) -> Self {
        let [a, b] = drift_axis.complement();
        Self {
            detector_id,
            coordinates: Vector2::new(position[a], position[b]),
            covariance: Matrix2::new(
                covariance[(a, a)],
                covariance[(a, b)],
                covariance[(b, a)],
                covariance[(b, b)],
            ),
            drift_axis,
            drift_coordinate: position[drift_axis.index()],
        }
    }

    pub fn reference_position(&self) -> Vector3 {
        let [a, b] = self.drift_axis.complement();
        let mut p = Vector3::zeros();
        p[a] = self.coordinates[0];
        p[b] = self.coordinates[1];
        p[self.drift_axis.index()] = self.drift_coordinate;
        p
    }
}
