//! Recursive trajectory estimator.
//!
//! One iteration is a forward pass over the measurements followed by a
//! backward pass. Each pass predicts the state to the next measurement with
//! the [`Propagator`] and folds the measurement in with a Kalman update. Before
//! every pass except the very first, the covariance is inflated so that the
//! pass is dominated by the measurements rather than by the previous pass.
//!
//! The χ² of an iteration is the sum of the backward pass's χ² increments.
//! Iteration stops once at least `min_iterations` have run and the
//! relative χ² change falls below the convergence tolerance, or when
//! `max_iterations` is reached.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use super::propagate::{Propagator, MIN_MOMENTUM_GEV};
use super::{FitConfig, FitError, TrajectoryState};
use crate::measurement::Measurement;
use crate::seed::SeedState;
use crate::{Matrix6, Vector3, Vector6};

/// Terminal state of the estimator.
#[derive(Debug, Clone)]
pub struct EstimatorOutcome {
    /// True when the χ² settled within tolerance.
    pub converged: bool,
    pub iterations: u32,
    pub ndf: i32,
    /// State at the first measurement after the final backward pass.
    pub fitted: TrajectoryState,
    /// Smoothed state per measurement. Empty when history is not retained.
    pub states: Vec<TrajectoryState>,
    /// χ² increment per measurement of the final backward pass, in track order.
    pub chi2_increments: Vec<f64>,
}

/// Running state of one pass.
#[derive(Debug, Clone)]
struct Filtered {
    state: Vector6,
    covariance: Matrix6,
}

/// Forward/backward Kalman estimator bound to one configuration.
#[derive(Debug, Clone, Copy)]
pub struct KalmanEstimator<'a> {
    config: &'a FitConfig,
}

impl<'a> KalmanEstimator<'a> {
    pub fn new(config: &'a FitConfig) -> Self {
        Self { config }
    }

    /// Fit the measurements starting from `seed`.
    ///
    /// `measurements` must be in propagation order and hold at least two
    /// entries.
    pub fn estimate(&self, seed: &SeedState, measurements: &[Measurement]) -> Result<EstimatorOutcome, FitError> {
        let cfg = self.config;
        let propagator = Propagator::new(&cfg.field, &cfg.material, seed.hypothesis, cfg.max_step_cm);
        let n = measurements.len();
        let ndf = measurements.iter().map(Measurement::dim).sum::<usize>() as i32 - 5;

        let mut current = Filtered {
            state: Vector6::new(
                seed.position.x,
                seed.position.y,
                seed.position.z,
                seed.momentum.x,
                seed.momentum.y,
                seed.momentum.z,
            ),
            covariance: seed.covariance,
        };

        let mut forward_updated: Vec<Filtered> = Vec::with_capacity(n);
        let mut backward_predicted: Vec<Filtered> = Vec::with_capacity(n);
        let mut increments = vec![0.0; n];
        let mut prev_chi2: Option<f64> = None;
        let mut converged = false;
        let mut iteration = 0u32;

        while iteration < cfg.max_iterations {
            iteration += 1;
            let fail = move |reason: String| FitError::EstimatorFailure { iteration, reason };

            // Forward pass
            if iteration > 1 {
                self.blow_up(&mut current.covariance);
            }
            forward_updated.clear();
            for m in measurements {
                let pred = propagator
                    .predict(&current.state, &current.covariance, m)
                    .map_err(fail)?;
                let (updated, _) = kalman_update(&pred.state, &pred.covariance, m).map_err(fail)?;
                forward_updated.push(updated.clone());
                current = updated;
            }

            // Backward pass
            self.blow_up(&mut current.covariance);
            backward_predicted.clear();
            let mut chi2 = 0.0;
            for (i, m) in measurements.iter().enumerate().rev() {
                let pred = propagator
                    .predict(&current.state, &current.covariance, m)
                    .map_err(fail)?;
                backward_predicted.push(Filtered {
                    state: pred.state,
                    covariance: pred.covariance,
                });
                let (updated, dchi2) = kalman_update(&pred.state, &pred.covariance, m).map_err(fail)?;
                increments[i] = dchi2;
                chi2 += dchi2;
                current = updated;
            }
            backward_predicted.reverse();

            if !chi2.is_finite() {
                return Err(fail("χ² is not finite".to_string()));
            }
            debug!(
                "Iteration {}: χ² = {:.4}, p = {:.4} GeV/c",
                iteration,
                chi2,
                momentum_of(&current.state).norm()
            );

            if let Some(prev) = prev_chi2 {
                let change = (chi2 - prev).abs() / prev.max(1.0);
                if iteration >= cfg.min_iterations && change < cfg.convergence_tolerance {
                    converged = true;
                    break;
                }
            }
            prev_chi2 = Some(chi2);
        }

        let fitted = TrajectoryState::from_vector(&current.state, current.covariance);

        let states = if cfg.retain_history {
            smooth_all(&forward_updated, &backward_predicted)
        } else {
            Vec::new()
        };

        Ok(EstimatorOutcome {
            converged,
            iterations: iteration,
            ndf,
            fitted,
            states,
            chi2_increments: increments,
        })
    }

    /// Reset correlations and inflate variances.
    fn blow_up(&self, covariance: &mut Matrix6) {
        let factor = self.config.blow_up_factor;
        let cap = self.config.blow_up_max;
        for i in 0..6 {
            for j in 0..6 {
                if i == j {
                    covariance[(i, i)] = (covariance[(i, i)] * factor).min(cap);
                } else {
                    covariance[(i, j)] = 0.0;
                }
            }
        }
    }
}

fn momentum_of(y: &Vector6) -> Vector3 {
    Vector3::new(y[3], y[4], y[5])
}

/// Fold one measurement into a predicted state.
///
/// Returns the updated state and the χ² increment `rᵀ S⁻¹ r` of the predicted
/// residual. The covariance update uses the Joseph form to stay symmetric and
/// positive-semidefinite.
fn kalman_update(state: &Vector6, covariance: &Matrix6, m: &Measurement) -> Result<(Filtered, f64), String> {
    let h = m.projection();
    let v = m.covariance();
    let p = DMatrix::from_column_slice(6, 6, covariance.as_slice());
    let x = DVector::from_column_slice(state.as_slice());

    let residual = m.values() - &h * &x;
    let s = &h * &p * h.transpose() + &v;
    let s_inv = s
        .cholesky()
        .ok_or_else(|| "innovation covariance is not positive definite".to_string())?
        .inverse();
    let gain = &p * h.transpose() * &s_inv;

    let x_new = &x + &gain * &residual;
    let ikh = DMatrix::<f64>::identity(6, 6) - &gain * &h;
    let p_new = &ikh * &p * ikh.transpose() + &gain * &v * gain.transpose();
    let p_new = (&p_new + p_new.transpose()) * 0.5;

    let dchi2 = (residual.transpose() * &s_inv * &residual)[(0, 0)];

    let state = Vector6::from_column_slice(x_new.as_slice());
    let covariance = Matrix6::from_column_slice(p_new.as_slice());
    if !state.iter().all(|v| v.is_finite()) || !covariance.iter().all(|v| v.is_finite()) {
        return Err("updated state is not finite".to_string());
    }
    if momentum_of(&state).norm() < MIN_MOMENTUM_GEV {
        return Err("updated momentum vanished".to_string());
    }
    trace!("Update at detector {}: Δχ² = {:.4}", m.detector_id(), dchi2);
    Ok((Filtered { state, covariance }, dchi2))
}

/// Smoothed state per measurement, or none at all when any combination is
/// singular. The fitted state does not depend on the smoother, so a failure
/// here only costs the history.
fn smooth_all(forward: &[Filtered], backward: &[Filtered]) -> Vec<TrajectoryState> {
    match forward
        .iter()
        .zip(backward.iter())
        .map(|(f, b)| smooth(f, b))
        .collect::<Option<Vec<_>>>()
    {
        Some(states) => states,
        None => {
            warn!("Smoother covariance is singular, dropping per-measurement states");
            Vec::new()
        }
    }
}

/// Combine a forward-updated and a backward-predicted estimate at the same
/// measurement into the smoothed state.
fn smooth(forward: &Filtered, backward: &Filtered) -> Option<TrajectoryState> {
    let sum = forward.covariance + backward.covariance;
    let sum_inv = sum.cholesky()?.inverse();
    let gain = forward.covariance * sum_inv;
    let state = forward.state + gain * (backward.state - forward.state);
    let covariance = forward.covariance - gain * forward.covariance;
    let covariance = (covariance + covariance.transpose()) * 0.5;
    Some(TrajectoryState::from_vector(&state, covariance))
}
