//! Full 3-D space-point measurement.

use crate::{Matrix3, Vector3};

/// A cluster measured in all three coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SpacePoint {
    pub detector_id: i32,
    /// Position in cm.
    pub position: Vector3,
    /// Covariance in cm².
    pub covariance: Matrix3,
}

impl SpacePoint {
    pub fn new(detector_id: i32, position: Vector3, covariance: Matrix3) -> Self {
        Self {
            detector_id,
            position,
            covariance,
        }
    }
}
