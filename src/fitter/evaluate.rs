//! Fit status evaluation.
//!
//! Pure classification of the estimator's terminal state, plus the fit-quality
//! statistic; it never fails and never touches the estimator again.

use super::kalman::EstimatorOutcome;
use super::{FitError, FitResult, FitStatus};

/// Classify a finished estimator run.
///
/// χ² is the sum of the final backward pass's increments.
pub fn evaluate(track_id: i32, charge: f64, outcome: EstimatorOutcome, fit_time_ms: f32) -> FitResult {
    let status = if outcome.converged {
        FitStatus::Converged
    } else {
        FitStatus::PartiallyConverged
    };
    FitResult {
        track_id,
        status,
        chi2: outcome.chi2_increments.iter().sum(),
        ndf: outcome.ndf,
        iterations: outcome.iterations,
        charge,
        fitted_state: Some(outcome.fitted),
        states: outcome.states,
        chi2_increments: outcome.chi2_increments,
        error: None,
        fit_time_ms,
    }
}

/// Classify an aborted fit.
pub fn evaluate_failure(track_id: i32, error: FitError, fit_time_ms: f32) -> FitResult {
    FitResult::failure(track_id, error, fit_time_ms)
}
