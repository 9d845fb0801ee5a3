//! Track propagation through the magnetic field.
//!
//! The state `(x, y, z, px, py, pz)` is transported along the path length `s`
//! by integrating the equation of motion of a charged particle,
//!
//! ```text
//! dx/ds = t,     dp/ds = κ · q · (t × B),     t = p / |p|
//! ```
//!
//! with a fixed-step fourth-order Runge-Kutta scheme. A measurement is reached
//! at the point of closest approach of the projected trajectory to the measured
//! coordinates. The transport Jacobian is obtained by central differences at
//! that fixed path length.

use nalgebra::DVector;

use crate::field::{FieldModel, Material, CURVATURE_CONSTANT};
use crate::measurement::Measurement;
use crate::particle::ParticleHypothesis;
use crate::{Matrix3, Matrix6, Vector3, Vector6};

/// Newton iterations allowed when searching for the closest approach.
const MAX_APPROACH_ITERATIONS: usize = 50;

/// Path-length change (cm) below which the closest approach has been found.
const APPROACH_TOLERANCE_CM: f64 = 1e-7;

/// Relative step used for the finite-difference Jacobian.
const JACOBIAN_STEP: f64 = 1e-6;

/// Momentum magnitude (GeV/c) below which a state is considered stopped.
pub(crate) const MIN_MOMENTUM_GEV: f64 = 1e-9;

/// State vector and covariance after transport to a measurement.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub state: Vector6,
    pub covariance: Matrix6,
    /// Signed path length travelled (cm).
    pub path_cm: f64,
}

/// Transports track states for one particle hypothesis.
#[derive(Debug, Clone, Copy)]
pub struct Propagator<'a> {
    field: &'a FieldModel,
    material: &'a Material,
    hypothesis: ParticleHypothesis,
    max_step_cm: f64,
}

impl<'a> Propagator<'a> {
    pub fn new(
        field: &'a FieldModel,
        material: &'a Material,
        hypothesis: ParticleHypothesis,
        max_step_cm: f64,
    ) -> Self {
        Self {
            field,
            material,
            hypothesis,
            max_step_cm,
        }
    }

    /// Right-hand side of the equation of motion.
    fn derivative(&self, y: &Vector6) -> Vector6 {
        let pos = Vector3::new(y[0], y[1], y[2]);
        let p = Vector3::new(y[3], y[4], y[5]);
        let t = p / p.norm();
        let dp = t.cross(&self.field.field_at(&pos)) * (CURVATURE_CONSTANT * self.hypothesis.charge);
        Vector6::new(t.x, t.y, t.z, dp.x, dp.y, dp.z)
    }

    /// Transport a state by a signed path length `s` (cm).
    pub fn transport(&self, y: &Vector6, s: f64) -> Vector6 {
        if s == 0.0 {
            return *y;
        }
        let nsteps = (s.abs() / self.max_step_cm).ceil().max(1.0) as usize;
        let h = s / nsteps as f64;
        let mut y = *y;
        for _ in 0..nsteps {
            let k1 = self.derivative(&y);
            let k2 = self.derivative(&(y + k1 * (h / 2.0)));
            let k3 = self.derivative(&(y + k2 * (h / 2.0)));
            let k4 = self.derivative(&(y + k3 * h));
            y += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
        }
        y
    }

    /// Signed path length from `y` to the point where the projected
    /// trajectory is closest to the measured coordinates.
    pub fn path_to(&self, y: &Vector6, measurement: &Measurement) -> Result<f64, String> {
        let z = measurement.values();
        let mut current = *y;
        let mut s = 0.0;
        for _ in 0..MAX_APPROACH_ITERATIONS {
            let pos = Vector3::new(current[0], current[1], current[2]);
            let p = Vector3::new(current[3], current[4], current[5]);
            let t = p / p.norm();
            let ht: DVector<f64> = measurement.project(&t);
            let denom = ht.norm_squared();
            if denom < 1e-12 {
                return Err("trajectory runs parallel to the unmeasured axis".to_string());
            }
            let residual = measurement.project(&pos) - &z;
            let ds = -ht.dot(&residual) / denom;
            if !ds.is_finite() {
                return Err("closest approach is not finite".to_string());
            }
            current = self.transport(&current, ds);
            s += ds;
            if ds.abs() < APPROACH_TOLERANCE_CM {
                return Ok(s);
            }
        }
        Err(format!(
            "closest approach did not converge in {} iterations",
            MAX_APPROACH_ITERATIONS
        ))
    }

    /// Transport Jacobian `∂y(s)/∂y(0)` at fixed path length.
    pub fn jacobian(&self, y: &Vector6, s: f64) -> Matrix6 {
        let pmag = Vector3::new(y[3], y[4], y[5]).norm();
        let mut jac = Matrix6::zeros();
        for j in 0..6 {
            let eps = if j < 3 {
                JACOBIAN_STEP * (1.0 + y[j].abs())
            } else {
                JACOBIAN_STEP * pmag.max(MIN_MOMENTUM_GEV)
            };
            let mut plus = *y;
            let mut minus = *y;
            plus[j] += eps;
            minus[j] -= eps;
            let col = (self.transport(&plus, s) - self.transport(&minus, s)) / (2.0 * eps);
            jac.set_column(j, &col);
        }
        jac
    }

    /// Multiple-scattering noise added to the momentum block after a path
    /// of length `s` ending in state `y`.
    pub fn process_noise(&self, y: &Vector6, s: f64) -> Matrix6 {
        let p = Vector3::new(y[3], y[4], y[5]);
        let pmag = p.norm();
        let theta0 = self.material.scattering_angle(
            s,
            pmag,
            self.hypothesis.beta(pmag),
            self.hypothesis.charge,
        );
        let mut q = Matrix6::zeros();
        if theta0 > 0.0 {
            let t = p / pmag;
            let block: Matrix3 = (Matrix3::identity() - t * t.transpose()) * (pmag * theta0).powi(2);
            q.fixed_view_mut::<3, 3>(3, 3).copy_from(&block);
        }
        q
    }

    /// Predict a state and covariance at a measurement.
    pub fn predict(&self, y: &Vector6, covariance: &Matrix6, measurement: &Measurement) -> Result<Prediction, String> {
        let s = self.path_to(y, measurement)?;
        let state = self.transport(y, s);
        let jac = self.jacobian(y, s);
        let covariance = jac * covariance * jac.transpose() + self.process_noise(&state, s);
        let covariance = (covariance + covariance.transpose()) * 0.5;

        if !state.iter().all(|v| v.is_finite()) || !covariance.iter().all(|v| v.is_finite()) {
            return Err("propagated state is not finite".to_string());
        }
        if Vector3::new(state[3], state[4], state[5]).norm() < MIN_MOMENTUM_GEV {
            return Err("propagated momentum vanished".to_string());
        }
        Ok(Prediction {
            state,
            covariance,
            path_cm: s,
        })
    }
}
