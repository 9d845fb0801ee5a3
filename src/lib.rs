//! # gtpcfit
//!
//! **Kalman-filter track fitting** for time-projection-chamber (TPC) hit
//! clusters in a magnetic field.
//!
//! Given the clusters that track finding attributed to one particle, `gtpcfit`
//! estimates the particle's trajectory (position, momentum and their
//! covariance) with an iterated forward/backward Kalman filter, and reports
//! how well the fit went.
//!
//! ## Features
//!
//! - **Runge-Kutta propagation** through a uniform magnetic field, with
//!   optional multiple-scattering noise from a homogeneous medium
//! - **Space-point and pad-plane measurements**, chosen per detector segment
//! - **Pluggable momentum seeds**: fixed direction, chord, or three-point helix
//! - **Explicit fit outcomes**: every track yields a [`FitResult`] with a
//!   [`FitStatus`] and, on failure, a typed [`FitError`]
//! - **Parallel batches** via [rayon](https://docs.rs/rayon) (feature `parallel`)
//! - **Zero-copy storage** of cluster stores with [rkyv](https://docs.rs/rkyv),
//!   plus CSV import/export
//!
//! ## Example
//!
//! ```no_run
//! use gtpcfit::{FitConfig, FitStatus, TrackFitter};
//! use gtpcfit::io::read_clusters_csv;
//!
//! // All tracks in the file are fitted as positive pions
//! let store = read_clusters_csv("data/clusters.csv", 211).unwrap();
//!
//! let fitter = TrackFitter::new(FitConfig::default()).unwrap();
//! for result in fitter.fit_tracks(&store) {
//!     if result.status == FitStatus::Converged {
//!         let p = result.momentum().unwrap();
//!         println!("Track {}: |p| = {:.3} GeV/c, χ²/ndf = {:.2}",
//!             result.track_id, p.norm(), result.reduced_chi2().unwrap_or(0.0));
//!     }
//! }
//! ```
//!
//! ## Units
//!
//! Internally lengths are in cm, momenta in GeV/c and fields in tesla.
//! Cluster positions may be supplied in any [`units::LengthUnit`].
//!

pub mod cluster;
pub mod field;
pub mod fitter;
pub mod io;
pub mod measurement;
pub mod particle;
pub mod seed;
pub mod store;
pub mod units;

pub use cluster::{ClusterCovariance, HitCluster};
pub use field::{FieldModel, Material};
pub use fitter::{
    FitConfig, FitError, FitErrorKind, FitResult, FitStatus, TrackFitter, TrajectoryState,
};
pub use measurement::{DetectorKind, Measurement, MeasurementAdapter};
pub use particle::ParticleHypothesis;
pub use seed::{Chord, FixedPolarAngle, MomentumSeed, SeedBuilder, SeedState, ThreePointHelix};
pub use store::{HitClusterStore, TrackCandidate};
pub use units::{FieldUnit, LengthUnit, UnitSystem};

// Track states need 64-bit floats: the blown-up covariances span ~10 orders
// of magnitude.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Vector6 = nalgebra::Vector6<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Matrix6 = nalgebra::Matrix6<f64>;
