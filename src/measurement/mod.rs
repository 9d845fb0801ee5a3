//! Measurement models for the recursive estimator.
//!
//! Every adapted cluster becomes one [`Measurement`]. The variant is chosen by
//! the [`DetectorKind`] registered for the cluster's detector segment and
//! decides which linear combination of the track state the measurement
//! constrains:
//!
//! - [`Measurement::SpacePoint`]: all three coordinates.
//! - [`Measurement::PadPlane`]: the two coordinates across a drift axis whose
//!   own coordinate is not trusted.
//!
//! All quantities are already in the estimator's units (cm, cm²).

pub mod adapter;
pub mod padplane;
pub mod spacepoint;

pub use adapter::MeasurementAdapter;
pub use padplane::PadPlane;
pub use spacepoint::SpacePoint;

use nalgebra::{DMatrix, DVector};

use crate::Vector3;

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two axes orthogonal to this one, in increasing index order.
    pub fn complement(self) -> [usize; 2] {
        match self {
            Axis::X => [1, 2],
            Axis::Y => [0, 2],
            Axis::Z => [0, 1],
        }
    }
}

/// Readout type of a detector segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorKind {
    /// Full 3-D space point.
    #[default]
    SpacePoint,
    /// Pad readout; the coordinate along `drift_axis` is not used.
    PadPlane { drift_axis: Axis },
}

/// An adapted cluster, in estimator units.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    SpacePoint(SpacePoint),
    PadPlane(PadPlane),
}

impl Measurement {
    /// Number of measured coordinates.
    pub fn dim(&self) -> usize {
        match self {
            Measurement::SpacePoint(_) => 3,
            Measurement::PadPlane(_) => 2,
        }
    }

    pub fn detector_id(&self) -> i32 {
        match self {
            Measurement::SpacePoint(m) => m.detector_id,
            Measurement::PadPlane(m) => m.detector_id,
        }
    }

    /// Measured coordinates.
    pub fn values(&self) -> DVector<f64> {
        match self {
            Measurement::SpacePoint(m) => DVector::from_column_slice(m.position.as_slice()),
            Measurement::PadPlane(m) => DVector::from_column_slice(m.coordinates.as_slice()),
        }
    }

    /// Covariance of the measured coordinates.
    pub fn covariance(&self) -> DMatrix<f64> {
        match self {
            Measurement::SpacePoint(m) => DMatrix::from_column_slice(3, 3, m.covariance.as_slice()),
            Measurement::PadPlane(m) => DMatrix::from_column_slice(2, 2, m.covariance.as_slice()),
        }
    }

    /// Projection matrix `H` (dim × 6) from the track state
    /// `(x, y, z, px, py, pz)` to the measured coordinates.
    pub fn projection(&self) -> DMatrix<f64> {
        let rows = self.position_rows();
        let mut h = DMatrix::zeros(rows.len(), 6);
        for (r, &axis) in rows.iter().enumerate() {
            h[(r, axis)] = 1.0;
        }
        h
    }

    /// Apply the positional part of `H` to a 3-vector.
    pub fn project(&self, v: &Vector3) -> DVector<f64> {
        DVector::from_iterator(self.dim(), self.position_rows().iter().map(|&i| v[i]))
    }

    /// A 3-D point on the measurement, used for logging and seeding.
    pub fn reference_position(&self) -> Vector3 {
        match self {
            Measurement::SpacePoint(m) => m.position,
            Measurement::PadPlane(m) => m.reference_position(),
        }
    }

    fn position_rows(&self) -> Vec<usize> {
        match self {
            Measurement::SpacePoint(_) => vec![0, 1, 2],
            Measurement::PadPlane(m) => m.drift_axis.complement().to_vec(),
        }
    }
}
