//! Track fitting entry points: one track, or a whole store in parallel.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::evaluate::{evaluate, evaluate_failure};
use super::kalman::{EstimatorOutcome, KalmanEstimator};
use super::{FitConfig, FitError, FitResult, FitStatus};
use crate::measurement::{Measurement, MeasurementAdapter};
use crate::seed::SeedBuilder;
use crate::store::{HitClusterStore, TrackCandidate};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Fits track candidates with a fixed configuration.
///
/// The fitter holds no per-track state, so one instance can be shared by
/// every worker of a batch.
#[derive(Debug, Clone)]
pub struct TrackFitter {
    config: FitConfig,
    adapter: MeasurementAdapter,
}

impl TrackFitter {
    /// Create a fitter, rejecting configurations the estimator cannot use.
    pub fn new(config: FitConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let adapter = MeasurementAdapter::new(config.units, config.detectors.clone());
        Ok(Self { config, adapter })
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit one track candidate.
    ///
    /// Never panics on bad input: every failure is reported through a
    /// [`FitResult`] with status [`FitStatus::Failed`].
    pub fn fit_track(&self, candidate: &TrackCandidate, store: &HitClusterStore) -> FitResult {
        let t0 = Instant::now();
        let result = match self.try_fit(candidate, store) {
            Ok((outcome, charge)) => evaluate(candidate.track_id, charge, outcome, elapsed_ms(t0)),
            Err(e) => {
                debug!("Track {}: fit failed: {}", candidate.track_id, e);
                evaluate_failure(candidate.track_id, e, elapsed_ms(t0))
            }
        };
        debug!(
            "Track {}: {:?}, χ²/ndf = {:.3}/{}, {} iterations, {:.2}ms",
            result.track_id, result.status, result.chi2, result.ndf, result.iterations, result.fit_time_ms
        );
        result
    }

    fn try_fit(
        &self,
        candidate: &TrackCandidate,
        store: &HitClusterStore,
    ) -> Result<(EstimatorOutcome, f64), FitError> {
        if candidate.len() < 2 {
            return Err(FitError::UnderdeterminedTrack {
                clusters: candidate.len(),
            });
        }

        let measurements = candidate
            .cluster_indices
            .iter()
            .enumerate()
            .map(|(i, &idx)| {
                let cluster = store.cluster(idx).ok_or_else(|| FitError::InvalidMeasurement {
                    index: i,
                    reason: format!("cluster {} is not in the store", idx),
                })?;
                self.adapter.adapt(i, cluster)
            })
            .collect::<Result<Vec<Measurement>, FitError>>()?;

        let seed = SeedBuilder::new(&self.config).build(candidate, store)?;

        if !store.is_monotonic(candidate, &self.config.units) {
            warn!(
                "Track {}: fitting clusters in the given order anyway",
                candidate.track_id
            );
        }

        let outcome = KalmanEstimator::new(&self.config).estimate(&seed, &measurements)?;
        Ok((outcome, seed.hypothesis.charge))
    }

    /// Fit the given candidates. Results are returned in input order.
    ///
    /// With the `parallel` feature the candidates are fitted concurrently;
    /// a failing track never affects the others.
    pub fn fit_candidates(&self, candidates: &[TrackCandidate], store: &HitClusterStore) -> Vec<FitResult> {
        let t0 = Instant::now();

        #[cfg(feature = "parallel")]
        let results: Vec<FitResult> = candidates
            .par_iter()
            .map(|c| self.fit_track(c, store))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let results: Vec<FitResult> = candidates.iter().map(|c| self.fit_track(c, store)).collect();

        let converged = results
            .iter()
            .filter(|r| r.status == FitStatus::Converged)
            .count();
        let failed = results.iter().filter(|r| r.status == FitStatus::Failed).count();
        info!(
            "Fitted {} tracks in {:.1}ms: {} converged, {} partially converged, {} failed",
            results.len(),
            elapsed_ms(t0),
            converged,
            results.len() - converged - failed,
            failed
        );
        results
    }

    /// Fit every candidate registered in the store.
    pub fn fit_tracks(&self, store: &HitClusterStore) -> Vec<FitResult> {
        self.fit_candidates(store.candidates(), store)
    }
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}
