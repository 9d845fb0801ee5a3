//! Cluster → measurement adaptation.
//!
//! The adapter holds the detector-segment registry and the incoming unit
//! convention. It is built once from the [`FitConfig`](crate::FitConfig) and
//! only read afterwards, so a single adapter serves every track of a batch.

use std::collections::HashMap;

use nalgebra::DMatrix;

use super::{DetectorKind, Measurement, PadPlane, SpacePoint};
use crate::units::UnitSystem;
use crate::{FitError, HitCluster, Matrix3};

/// Relative tolerance when checking covariance symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Eigenvalues down to `-PSD_TOLERANCE × largest` count as zero.
const PSD_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct MeasurementAdapter {
    units: UnitSystem,
    detectors: HashMap<i32, DetectorKind>,
}

impl MeasurementAdapter {
    pub fn new(units: UnitSystem, detectors: HashMap<i32, DetectorKind>) -> Self {
        Self { units, detectors }
    }

    /// Readout kind registered for a detector segment.
    pub fn kind(&self, detector_id: i32) -> Option<DetectorKind> {
        self.detectors.get(&detector_id).copied()
    }

    pub fn units(&self) -> &UnitSystem {
        &self.units
    }

    /// Convert a cluster into the estimator's measurement representation.
    ///
    /// `index` is the cluster's position within its track and is only used to
    /// label errors. Fails with [`FitError::InvalidMeasurement`] when the
    /// detector segment is unregistered, a value is not finite, or the
    /// covariance is asymmetric, not positive-semidefinite, or singular on
    /// the measured coordinates.
    pub fn adapt(&self, index: usize, cluster: &HitCluster) -> Result<Measurement, FitError> {
        let invalid = |reason: String| FitError::InvalidMeasurement { index, reason };

        let kind = self.kind(cluster.detector_id).ok_or_else(|| {
            invalid(format!("detector segment {} is not registered", cluster.detector_id))
        })?;

        if !cluster.is_finite() {
            return Err(invalid("non-finite position or covariance".to_string()));
        }

        let n = cluster.covariance.dim();
        let entries = cluster.covariance.entries();
        let full = DMatrix::from_fn(n, n, |i, j| entries[i * n + j].2);
        check_symmetric(&full).map_err(invalid)?;
        check_positive_semidefinite(full).map_err(invalid)?;

        let position = cluster.position_cm(&self.units);
        let covariance = cluster.spatial_covariance_cm2(&self.units);

        let measurement = match kind {
            DetectorKind::SpacePoint => {
                check_positive_definite(&covariance, "spatial covariance").map_err(invalid)?;
                Measurement::SpacePoint(SpacePoint::new(cluster.detector_id, position, covariance))
            }
            DetectorKind::PadPlane { drift_axis } => {
                let pad = PadPlane::from_spatial(cluster.detector_id, &position, &covariance, drift_axis);
                if pad.covariance.cholesky().is_none() {
                    return Err(invalid("pad-plane covariance is not positive definite".to_string()));
                }
                Measurement::PadPlane(pad)
            }
        };
        Ok(measurement)
    }
}

fn check_symmetric(m: &DMatrix<f64>) -> Result<(), String> {
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            let a = m[(i, j)];
            let b = m[(j, i)];
            let scale = a.abs().max(b.abs()).max(f64::MIN_POSITIVE);
            if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(format!("covariance is not symmetric at ({}, {})", i, j));
            }
        }
    }
    Ok(())
}

fn check_positive_semidefinite(m: DMatrix<f64>) -> Result<(), String> {
    let eig = m.symmetric_eigen();
    let largest = eig.eigenvalues.amax();
    let smallest = eig.eigenvalues.min();
    if smallest < -PSD_TOLERANCE * largest.max(f64::MIN_POSITIVE) {
        return Err(format!(
            "covariance is not positive-semidefinite (smallest eigenvalue {:.3e})",
            smallest
        ));
    }
    Ok(())
}

fn check_positive_definite(m: &Matrix3, what: &str) -> Result<(), String> {
    if m.cholesky().is_none() {
        return Err(format!("{} is singular or not positive definite", what));
    }
    Ok(())
}
