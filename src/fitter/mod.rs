//! Kalman-filter track fitting of TPC hit clusters.
//!
//! This module implements the recursive trajectory estimator and the types
//! around it. Fitting one track runs through four stages:
//!
//! 1. **Seeding**: the first cluster of the candidate gives the starting
//!    position and covariance; a [`MomentumSeed`] strategy supplies the
//!    initial momentum.
//! 2. **Adaptation**: every cluster is converted into a [`Measurement`](crate::Measurement)
//!    according to the detector segment that produced it.
//! 3. **Estimation**: alternating forward and backward Kalman passes, each a
//!    predict/update step per measurement, repeated until the χ² settles or
//!    the iteration bound is hit.
//! 4. **Evaluation**: the estimator's terminal state is classified into a
//!    [`FitStatus`] and packaged as a [`FitResult`].
//!
//! Each stage reports failures as a [`FitError`]; none of them escape the
//! track boundary. [`TrackFitter::fit_track`] always returns a result.

pub mod evaluate;
pub mod fit;
pub mod kalman;
pub mod propagate;

pub use fit::TrackFitter;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::field::{FieldModel, Material};
use crate::measurement::DetectorKind;
use crate::seed::{FixedPolarAngle, MomentumSeed};
use crate::units::UnitSystem;
use crate::{Matrix6, Vector3, Vector6};

// ── Status codes ────────────────────────────────────────────────────────────

/// Outcome of a track fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// The χ² settled within tolerance after at least the minimum number of
    /// iterations.
    Converged,
    /// The iteration bound was reached before the χ² settled. The fitted
    /// state is still usable.
    PartiallyConverged,
    /// A fitted result whose per-measurement states were discarded.
    Pruned,
    /// The fit was aborted; see [`FitResult::error`].
    Failed,
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Why a track fit was aborted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("invalid measurement at cluster {index}: {reason}")]
    InvalidMeasurement { index: usize, reason: String },

    #[error("insufficient seed data: {reason}")]
    InsufficientSeedData { reason: String },

    #[error("estimator failure in iteration {iteration}: {reason}")]
    EstimatorFailure { iteration: u32, reason: String },

    #[error("underdetermined track: {clusters} cluster(s), at least 2 required")]
    UnderdeterminedTrack { clusters: usize },
}

/// Discriminant of [`FitError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitErrorKind {
    InvalidMeasurement,
    InsufficientSeedData,
    EstimatorFailure,
    UnderdeterminedTrack,
}

impl FitError {
    pub fn kind(&self) -> FitErrorKind {
        match self {
            FitError::InvalidMeasurement { .. } => FitErrorKind::InvalidMeasurement,
            FitError::InsufficientSeedData { .. } => FitErrorKind::InsufficientSeedData,
            FitError::EstimatorFailure { .. } => FitErrorKind::EstimatorFailure,
            FitError::UnderdeterminedTrack { .. } => FitErrorKind::UnderdeterminedTrack,
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling a track fit.
///
/// Built once and shared read-only by every fit of a batch.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Magnetic field. Default: uniform 5 kG along +y.
    pub field: FieldModel,
    /// Material between measurements. Default: vacuum.
    pub material: Material,
    /// Unit convention of incoming clusters. Default: centimetres.
    pub units: UnitSystem,
    /// Minimum number of forward/backward iterations. Default 5.
    pub min_iterations: u32,
    /// Maximum number of forward/backward iterations. Default 20.
    pub max_iterations: u32,
    /// Convergence threshold on the relative χ² change between iterations,
    /// `|χ²ₖ − χ²ₖ₋₁| / max(χ²ₖ₋₁, 1)`. Default 1e-3.
    pub convergence_tolerance: f64,
    /// Factor applied to the first cluster's covariance to form the seed
    /// covariance. Default 0.1.
    pub seed_cov_scale: f64,
    /// Keep the smoothed state at every measurement. Default true.
    pub retain_history: bool,
    /// Largest Runge-Kutta step in cm. Default 1.0.
    pub max_step_cm: f64,
    /// Covariance inflation applied before every pass after the first.
    /// Default 1000.
    pub blow_up_factor: f64,
    /// Upper bound on any inflated diagonal element. Default 1e6.
    pub blow_up_max: f64,
    /// Initial-momentum strategy. Default: [`FixedPolarAngle`].
    pub momentum_seed: Arc<dyn MomentumSeed>,
    /// Detector segment registry. Default: segment 0 is a space-point detector.
    pub detectors: HashMap<i32, DetectorKind>,
}

impl Default for FitConfig {
    fn default() -> Self {
        let mut detectors = HashMap::new();
        detectors.insert(0, DetectorKind::SpacePoint);
        Self {
            field: FieldModel::default(),
            material: Material::Vacuum,
            units: UnitSystem::default(),
            min_iterations: 5,
            max_iterations: 20,
            convergence_tolerance: 1e-3,
            seed_cov_scale: 0.1,
            retain_history: true,
            max_step_cm: 1.0,
            blow_up_factor: 1000.0,
            blow_up_max: 1e6,
            momentum_seed: Arc::new(FixedPolarAngle::default()),
            detectors,
        }
    }
}

impl FitConfig {
    /// Create a configuration for the given field, otherwise default.
    pub fn new(field: FieldModel) -> Self {
        Self {
            field,
            ..Default::default()
        }
    }

    /// Register (or replace) the readout kind of a detector segment.
    pub fn with_detector(mut self, detector_id: i32, kind: DetectorKind) -> Self {
        self.detectors.insert(detector_id, kind);
        self
    }

    /// Replace the initial-momentum strategy.
    pub fn with_momentum_seed<S: MomentumSeed + 'static>(mut self, seed: S) -> Self {
        self.momentum_seed = Arc::new(seed);
        self
    }

    /// Check the configuration for values the estimator cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.min_iterations >= 1, "min_iterations must be at least 1");
        anyhow::ensure!(
            self.max_iterations >= self.min_iterations,
            "max_iterations ({}) must be >= min_iterations ({})",
            self.max_iterations,
            self.min_iterations
        );
        anyhow::ensure!(
            self.convergence_tolerance >= 0.0 && self.convergence_tolerance.is_finite(),
            "convergence_tolerance must be finite and non-negative"
        );
        anyhow::ensure!(
            self.seed_cov_scale > 0.0 && self.seed_cov_scale.is_finite(),
            "seed_cov_scale must be positive"
        );
        anyhow::ensure!(
            self.max_step_cm > 0.0 && self.max_step_cm.is_finite(),
            "max_step_cm must be positive"
        );
        anyhow::ensure!(self.blow_up_factor >= 1.0, "blow_up_factor must be >= 1");
        anyhow::ensure!(self.blow_up_max > 0.0, "blow_up_max must be positive");
        anyhow::ensure!(
            self.field.vector().iter().all(|b| b.is_finite()),
            "field must be finite"
        );
        if let Material::Homogeneous {
            radiation_length_cm,
        } = self.material
        {
            anyhow::ensure!(
                radiation_length_cm > 0.0,
                "radiation length must be positive"
            );
        }
        anyhow::ensure!(!self.detectors.is_empty(), "no detector segments registered");
        Ok(())
    }
}

// ── Trajectory state ────────────────────────────────────────────────────────

/// Track state at one point: position (cm), momentum (GeV/c) and their joint
/// 6×6 covariance ordered `(x, y, z, px, py, pz)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryState {
    pub position: Vector3,
    pub momentum: Vector3,
    pub covariance: Matrix6,
}

impl TrajectoryState {
    pub fn new(position: Vector3, momentum: Vector3, covariance: Matrix6) -> Self {
        Self {
            position,
            momentum,
            covariance,
        }
    }

    pub(crate) fn from_vector(v: &Vector6, covariance: Matrix6) -> Self {
        Self {
            position: Vector3::new(v[0], v[1], v[2]),
            momentum: Vector3::new(v[3], v[4], v[5]),
            covariance,
        }
    }

    /// State as a 6-vector `(x, y, z, px, py, pz)`.
    pub fn to_vector(&self) -> Vector6 {
        Vector6::new(
            self.position.x,
            self.position.y,
            self.position.z,
            self.momentum.x,
            self.momentum.y,
            self.momentum.z,
        )
    }

    /// Momentum magnitude in GeV/c.
    pub fn momentum_magnitude(&self) -> f64 {
        self.momentum.norm()
    }

    /// Unit direction of flight.
    pub fn direction(&self) -> Vector3 {
        self.momentum.normalize()
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.momentum.iter().all(|v| v.is_finite())
            && self.covariance.iter().all(|v| v.is_finite())
    }
}

// ── Fit result ──────────────────────────────────────────────────────────────

/// Result of fitting one track.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Identifier of the fitted track candidate.
    pub track_id: i32,
    /// Outcome classification.
    pub status: FitStatus,
    /// Fit-quality statistic: sum of squared normalized residuals of the
    /// final backward pass. Zero for failed fits.
    pub chi2: f64,
    /// Degrees of freedom: measured coordinates minus 5 track parameters.
    pub ndf: i32,
    /// Forward/backward iterations performed.
    pub iterations: u32,
    /// Charge hypothesis the track was fitted with (units of e).
    pub charge: f64,
    /// Fitted state at the first measurement (only for fitted tracks).
    pub fitted_state: Option<TrajectoryState>,
    /// Smoothed state at every measurement, in track order. Empty unless
    /// history retention is enabled and the fit succeeded.
    pub states: Vec<TrajectoryState>,
    /// χ² contribution of each measurement in the final backward pass.
    pub chi2_increments: Vec<f64>,
    /// The error that aborted the fit, for `Failed` results.
    pub error: Option<FitError>,
    /// Wall-clock time spent fitting, in milliseconds.
    pub fit_time_ms: f32,
}

impl FitResult {
    /// Create a failure result with the given error and elapsed time.
    pub(crate) fn failure(track_id: i32, error: FitError, fit_time_ms: f32) -> Self {
        Self {
            track_id,
            status: FitStatus::Failed,
            chi2: 0.0,
            ndf: 0,
            iterations: 0,
            charge: 0.0,
            fitted_state: None,
            states: Vec::new(),
            chi2_increments: Vec::new(),
            error: Some(error),
            fit_time_ms,
        }
    }

    /// True for every outcome that carries a usable fitted state.
    pub fn is_fitted(&self) -> bool {
        matches!(
            self.status,
            FitStatus::Converged | FitStatus::PartiallyConverged | FitStatus::Pruned
        )
    }

    /// Kind of the error that aborted the fit, if any.
    pub fn error_kind(&self) -> Option<FitErrorKind> {
        self.error.as_ref().map(FitError::kind)
    }

    /// χ² per degree of freedom, when there are degrees of freedom.
    pub fn reduced_chi2(&self) -> Option<f64> {
        if self.is_fitted() && self.ndf > 0 {
            Some(self.chi2 / self.ndf as f64)
        } else {
            None
        }
    }

    /// Fitted momentum at the first measurement.
    pub fn momentum(&self) -> Option<Vector3> {
        self.fitted_state.as_ref().map(|s| s.momentum)
    }

    /// Drop the per-measurement states to save memory.
    ///
    /// Only fitted results are affected; they become [`FitStatus::Pruned`]
    /// and keep their fitted state, χ² and iteration count.
    pub fn prune(&mut self) {
        if matches!(
            self.status,
            FitStatus::Converged | FitStatus::PartiallyConverged
        ) {
            self.states = Vec::new();
            self.chi2_increments = Vec::new();
            self.status = FitStatus::Pruned;
        }
    }
}
