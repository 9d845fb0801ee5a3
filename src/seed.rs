//! Seed construction: the starting state of the recursive estimator.
//!
//! The seed position and covariance come from the first cluster of the track.
//! A single point says nothing about momentum, so the initial momentum is
//! delegated to a [`MomentumSeed`] strategy chosen in the
//! [`FitConfig`](crate::FitConfig):
//!
//! - [`FixedPolarAngle`]: a fixed direction and magnitude, independent of the
//!   data. This is the GLAD-TPC reconstruction's historical behaviour.
//! - [`Chord`]: the direction from the first to the last cluster.
//! - [`ThreePointHelix`]: a circle through the first, middle and last
//!   clusters in the plane transverse to the field gives the transverse
//!   momentum; the rise along the field over the arc gives the rest.

use std::f64::consts::FRAC_PI_4;
use std::fmt::Debug;

use tracing::debug;

use crate::field::{FieldModel, CURVATURE_CONSTANT};
use crate::particle::ParticleHypothesis;
use crate::store::{HitClusterStore, TrackCandidate};
use crate::{FitConfig, FitError, Matrix6, Vector3};

/// Initial state handed to the estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedState {
    /// Position in cm.
    pub position: Vector3,
    /// Momentum in GeV/c.
    pub momentum: Vector3,
    /// Block-diagonal 6×6 covariance `(x, y, z, px, py, pz)`.
    pub covariance: Matrix6,
    /// Particle hypothesis (charge sign and mass) of the track.
    pub hypothesis: ParticleHypothesis,
}

/// What a momentum strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct SeedContext<'a> {
    /// Cluster positions of the track in cm, in propagation order.
    pub positions: &'a [Vector3],
    /// Charge hypothesis in units of e.
    pub charge: f64,
    pub field: &'a FieldModel,
}

/// Strategy producing the initial momentum vector (GeV/c) of a track.
pub trait MomentumSeed: Debug + Send + Sync {
    /// Return `None` when the strategy cannot produce a usable momentum.
    fn initial_momentum(&self, ctx: &SeedContext<'_>) -> Option<Vector3>;
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// Fixed direction given by polar and azimuthal angles, fixed magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPolarAngle {
    /// Polar angle from +z, radians.
    pub polar_angle: f64,
    /// Azimuth from +x in the x-y plane, radians.
    pub azimuth: f64,
    /// Momentum magnitude in GeV/c.
    pub magnitude: f64,
}

impl Default for FixedPolarAngle {
    /// (0.1, 0, 0.1) GeV/c: polar angle π/4 in the x-z plane.
    fn default() -> Self {
        Self {
            polar_angle: FRAC_PI_4,
            azimuth: 0.0,
            magnitude: 0.02_f64.sqrt(),
        }
    }
}

impl MomentumSeed for FixedPolarAngle {
    fn initial_momentum(&self, _ctx: &SeedContext<'_>) -> Option<Vector3> {
        let (st, ct) = self.polar_angle.sin_cos();
        let (sp, cp) = self.azimuth.sin_cos();
        Some(Vector3::new(st * cp, st * sp, ct) * self.magnitude)
    }
}

/// First-to-last cluster direction with a fixed magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chord {
    /// Momentum magnitude in GeV/c.
    pub magnitude: f64,
}

impl Default for Chord {
    fn default() -> Self {
        Self {
            magnitude: 0.02_f64.sqrt(),
        }
    }
}

impl MomentumSeed for Chord {
    fn initial_momentum(&self, ctx: &SeedContext<'_>) -> Option<Vector3> {
        chord_direction(ctx.positions).map(|d| d * self.magnitude)
    }
}

/// Helix through three clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreePointHelix {
    /// Magnitude used when the curvature cannot be measured (zero field,
    /// collinear clusters, fewer than three clusters).
    pub fallback_magnitude: f64,
}

impl Default for ThreePointHelix {
    fn default() -> Self {
        Self {
            fallback_magnitude: 0.02_f64.sqrt(),
        }
    }
}

impl MomentumSeed for ThreePointHelix {
    fn initial_momentum(&self, ctx: &SeedContext<'_>) -> Option<Vector3> {
        let fallback = || chord_direction(ctx.positions).map(|d| d * self.fallback_magnitude);

        let n = ctx.positions.len();
        let b = ctx.field.vector();
        if n < 3 || b.norm() == 0.0 || ctx.charge == 0.0 {
            return fallback();
        }
        let b_hat = b.normalize();
        let transverse = |p: &Vector3| p - b_hat * p.dot(&b_hat);

        let p1 = transverse(&ctx.positions[0]);
        let p2 = transverse(&ctx.positions[n / 2]);
        let p3 = transverse(&ctx.positions[n - 1]);

        // Circumcenter of the transverse triangle
        let a = p2 - p1;
        let c = p3 - p1;
        let axc = a.cross(&c);
        let denom = 2.0 * axc.norm_squared();
        if denom < 1e-12 * a.norm_squared() * c.norm_squared() || denom == 0.0 {
            return fallback();
        }
        let center = p1 + (c * a.norm_squared() - a * c.norm_squared()).cross(&axc) / denom;
        let radius = (p1 - center).norm();

        let r1 = p1 - center;
        let r3 = p3 - center;
        let mut tangent = b_hat.cross(&r1).normalize();
        if tangent.dot(&a) < 0.0 {
            tangent = -tangent;
        }
        let arc = radius * r1.cross(&r3).norm().atan2(r1.dot(&r3));
        if arc <= 0.0 {
            return fallback();
        }
        let rise = (ctx.positions[n - 1] - ctx.positions[0]).dot(&b_hat);

        let pt = CURVATURE_CONSTANT * ctx.charge.abs() * b.norm() * radius;
        debug!(
            "Helix seed: R = {:.2} cm, pT = {:.4} GeV/c, rise/arc = {:.3}",
            radius,
            pt,
            rise / arc
        );
        Some(tangent * pt + b_hat * (pt * rise / arc))
    }
}

fn chord_direction(positions: &[Vector3]) -> Option<Vector3> {
    let first = positions.first()?;
    let last = positions.last()?;
    let d = last - first;
    if d.norm() == 0.0 {
        None
    } else {
        Some(d.normalize())
    }
}

// ── Seed builder ────────────────────────────────────────────────────────────

/// Smallest eigenvalue of the seed position covariance, relative to the
/// largest, below which the first cluster cannot anchor the seed.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Builds the [`SeedState`] of a track candidate.
#[derive(Debug, Clone, Copy)]
pub struct SeedBuilder<'a> {
    config: &'a FitConfig,
}

impl<'a> SeedBuilder<'a> {
    pub fn new(config: &'a FitConfig) -> Self {
        Self { config }
    }

    /// Derive the seed from a candidate's first cluster.
    ///
    /// Fails with [`FitError::InsufficientSeedData`] when the particle code is
    /// unknown, the first cluster is missing or degenerate (non-finite, or a
    /// positional covariance that is not positive definite), or the momentum
    /// strategy gives up.
    pub fn build(&self, candidate: &TrackCandidate, store: &HitClusterStore) -> Result<SeedState, FitError> {
        let insufficient = |reason: String| FitError::InsufficientSeedData { reason };

        let hypothesis = ParticleHypothesis::from_pdg(candidate.pdg_code)
            .ok_or_else(|| insufficient(format!("unknown or neutral PDG code {}", candidate.pdg_code)))?;

        let first_index = *candidate
            .cluster_indices
            .first()
            .ok_or_else(|| insufficient("track has no clusters".to_string()))?;
        let first = store
            .cluster(first_index)
            .ok_or_else(|| insufficient(format!("first cluster {} is not in the store", first_index)))?;
        if !first.is_finite() {
            return Err(insufficient("first cluster is not finite".to_string()));
        }

        let units = &self.config.units;
        let position = first.position_cm(units);
        let spatial = first.spatial_covariance_cm2(units);
        let block = spatial * self.config.seed_cov_scale;
        let eigenvalues = block.symmetric_eigen().eigenvalues;
        if !(eigenvalues.min() > SINGULAR_TOLERANCE * eigenvalues.max()) {
            return Err(insufficient("first cluster covariance is singular".to_string()));
        }

        let mut covariance = Matrix6::zeros();
        covariance.fixed_view_mut::<3, 3>(0, 0).copy_from(&block);
        covariance.fixed_view_mut::<3, 3>(3, 3).copy_from(&block);

        let positions: Vec<Vector3> = candidate
            .cluster_indices
            .iter()
            .filter_map(|&i| store.cluster(i))
            .map(|c| c.position_cm(units))
            .collect();
        let ctx = SeedContext {
            positions: &positions,
            charge: hypothesis.charge,
            field: &self.config.field,
        };
        let momentum = self
            .config
            .momentum_seed
            .initial_momentum(&ctx)
            .filter(|p| p.iter().all(|v| v.is_finite()) && p.norm() > 0.0)
            .ok_or_else(|| insufficient("momentum seed strategy produced no momentum".to_string()))?;

        Ok(SeedState {
            position,
            momentum,
            covariance,
            hypothesis,
        })
    }
}
