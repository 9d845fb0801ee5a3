//! Synthetic track generators shared by the integration tests.
//!
//! Tracks are generated analytically (no propagation code from the crate is
//! involved) so the fitter is checked against an independent truth.

#![allow(dead_code)]

use gtpcfit::field::CURVATURE_CONSTANT;
use gtpcfit::{ClusterCovariance, HitCluster, Vector3};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

/// Clusters along a straight line, `spacing` cm apart.
///
/// With `rng`, each coordinate is smeared by a Gaussian of width `sigma`.
pub fn straight_track(
    origin: Vector3,
    direction: Vector3,
    spacing: f64,
    n: usize,
    sigma: f64,
    rng: Option<&mut StdRng>,
) -> Vec<HitCluster> {
    let dir = direction.normalize();
    let points: Vec<Vector3> = (0..n).map(|i| origin + dir * (spacing * i as f64)).collect();
    smear(points, sigma, 0, rng)
}

/// Clusters along a helix in a uniform field `b_tesla` along +y.
///
/// `momentum` is the momentum at `origin` in GeV/c; points are `spacing` cm
/// apart in path length.
pub fn helix_track(
    origin: Vector3,
    momentum: Vector3,
    charge: f64,
    b_tesla: f64,
    spacing: f64,
    n: usize,
    sigma: f64,
    rng: Option<&mut StdRng>,
) -> Vec<HitCluster> {
    let points: Vec<Vector3> = (0..n)
        .map(|i| helix_point(origin, momentum, charge, b_tesla, spacing * i as f64))
        .collect();
    smear(points, sigma, 0, rng)
}

/// Position after path length `s` on the helix described in [`helix_track`].
pub fn helix_point(origin: Vector3, momentum: Vector3, charge: f64, b_tesla: f64, s: f64) -> Vector3 {
    let p = momentum.norm();
    let t = momentum / p;
    let omega = CURVATURE_CONSTANT * charge * b_tesla / p;
    let a = (1.0 - t.y * t.y).sqrt();
    let psi0 = t.z.atan2(t.x);
    let psi = psi0 + omega * s;
    Vector3::new(
        origin.x + a / omega * (psi.sin() - psi0.sin()),
        origin.y + t.y * s,
        origin.z - a / omega * (psi.cos() - psi0.cos()),
    )
}

/// Turn points into clusters with isotropic variance `sigma²` (floored so the
/// covariance stays positive definite for noise-free tracks).
pub fn smear(points: Vec<Vector3>, sigma: f64, detector_id: i32, rng: Option<&mut StdRng>) -> Vec<HitCluster> {
    let var = (sigma * sigma).max(1e-4);
    let cov = ClusterCovariance::diagonal(var, var, var);
    match rng {
        Some(rng) => {
            let normal = Normal::new(0.0, sigma).unwrap();
            points
                .into_iter()
                .map(|p| {
                    let noisy = [
                        p.x + normal.sample(rng),
                        p.y + normal.sample(rng),
                        p.z + normal.sample(rng),
                    ];
                    HitCluster::new(noisy, cov.clone(), detector_id)
                })
                .collect()
        }
        None => points
            .into_iter()
            .map(|p| HitCluster::new([p.x, p.y, p.z], cov.clone(), detector_id))
            .collect(),
    }
}
