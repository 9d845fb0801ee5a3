//! Integration tests: generate synthetic TPC tracks with known kinematics and
//! verify the fitter recovers them and classifies the outcome correctly.

mod track_data;

use gtpcfit::measurement::Axis;
use gtpcfit::{
    Chord, ClusterCovariance, DetectorKind, FieldModel, FitConfig, FitErrorKind, FitStatus,
    HitCluster, HitClusterStore, LengthUnit, Material, ThreePointHelix, TrackCandidate, TrackFitter,
    UnitSystem, Vector3,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use track_data::{helix_point, helix_track, straight_track};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn straight_config() -> FitConfig {
    FitConfig::new(FieldModel::zero()).with_momentum_seed(Chord::default())
}

fn helix_config() -> FitConfig {
    FitConfig::default().with_momentum_seed(ThreePointHelix::default())
}

#[test]
fn test_straight_line_direction() {
    init_tracing();
    let dir = Vector3::new(0.6, -0.3, 1.0).normalize();
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(1, 211, straight_track(Vector3::new(1.0, 2.0, 3.0), dir, 2.5, 12, 0.0, None))
        .clone();

    let fitter = TrackFitter::new(straight_config()).unwrap();
    let res = fitter.fit_track(&cand, &store);

    assert_eq!(res.status, FitStatus::Converged);
    assert!(res.iterations >= 5);
    assert!(res.chi2 < 1e-6, "χ² = {}", res.chi2);
    assert_eq!(res.ndf, 12 * 3 - 5);
    let state = res.fitted_state.as_ref().unwrap();
    assert!((state.direction() - dir).norm() < 1e-6);
    assert!((state.position - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-6);
    assert_eq!(res.states.len(), 12);
}

#[test]
fn test_reference_configuration() {
    // The default seed points along (0.1, 0, 0.1) GeV/c; generate exactly that
    init_tracing();
    let p0 = Vector3::new(0.1, 0.0, 0.1);
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(1, 211, helix_track(Vector3::zeros(), p0, 1.0, 0.5, 2.0, 25, 0.0, None))
        .clone();

    let fitter = TrackFitter::new(FitConfig::default()).unwrap();
    let res = fitter.fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Converged);
    let p = res.momentum().unwrap();
    assert!((p - p0).norm() / p0.norm() < 1e-3, "p = {:?}", p);
    assert_eq!(res.charge, 1.0);
}

#[test]
fn test_helix_momentum_both_charges() {
    init_tracing();
    let fitter = TrackFitter::new(helix_config()).unwrap();
    for (pdg, charge) in [(211, 1.0), (-211, -1.0)] {
        let p0 = Vector3::new(0.15, 0.03, 0.08);
        let origin = Vector3::new(-5.0, 1.0, 10.0);
        let mut store = HitClusterStore::new();
        let cand = store
            .add_track(7, pdg, helix_track(origin, p0, charge, 0.5, 2.0, 30, 0.0, None))
            .clone();
        let res = fitter.fit_track(&cand, &store);
        assert!(res.is_fitted(), "{:?}", res.error);
        let p = res.momentum().unwrap();
        assert!((p.norm() - p0.norm()).abs() / p0.norm() < 1e-3, "pdg {}: p = {:?}", pdg, p);
        assert!((p.normalize() - p0.normalize()).norm() < 1e-3);
        assert_eq!(res.charge, charge);
    }
}

#[test]
fn test_noisy_helix_is_deterministic() {
    init_tracing();
    let p0 = Vector3::new(0.2, 0.05, 0.1);
    let make = || {
        let mut rng = StdRng::seed_from_u64(42);
        let mut store = HitClusterStore::new();
        store.add_track(
            3,
            211,
            helix_track(Vector3::zeros(), p0, 1.0, 0.5, 2.0, 30, 0.05, Some(&mut rng)),
        );
        store
    };
    let fitter = TrackFitter::new(helix_config()).unwrap();
    let store_a = make();
    let store_b = make();
    let a = fitter.fit_track(&store_a.candidates()[0], &store_a);
    let b = fitter.fit_track(&store_b.candidates()[0], &store_b);

    assert!(a.is_fitted());
    assert_eq!(a.status, b.status);
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.chi2, b.chi2);
    assert_eq!(a.fitted_state, b.fitted_state);

    // Resolution: sagitta of a few cm measured to 0.5 mm
    let p = a.momentum().unwrap();
    assert!((p.norm() - p0.norm()).abs() / p0.norm() < 0.1);
    assert!(a.chi2 > 0.0);
    assert!(a.reduced_chi2().unwrap() < 5.0);
}

#[test]
fn test_min_iterations_respected() {
    init_tracing();
    let cfg = FitConfig {
        min_iterations: 8,
        max_iterations: 12,
        ..straight_config()
    };
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(1, 2212, straight_track(Vector3::zeros(), Vector3::x(), 3.0, 6, 0.0, None))
        .clone();
    let res = TrackFitter::new(cfg).unwrap().fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Converged);
    assert!(res.iterations >= 8 && res.iterations <= 12);
}

#[test]
fn test_iteration_bound_gives_partial_convergence() {
    init_tracing();
    let cfg = FitConfig {
        min_iterations: 4,
        max_iterations: 4,
        convergence_tolerance: 0.0,
        ..straight_config()
    };
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(1, 211, straight_track(Vector3::zeros(), Vector3::z(), 3.0, 6, 0.0, None))
        .clone();
    let res = TrackFitter::new(cfg).unwrap().fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::PartiallyConverged);
    assert_eq!(res.iterations, 4);
    assert!(res.fitted_state.is_some());
    assert!(res.error.is_none());
}

#[test]
fn test_more_iterations_do_not_worsen_fit() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(
            1,
            211,
            helix_track(
                Vector3::zeros(),
                Vector3::new(0.12, -0.02, 0.12),
                1.0,
                0.5,
                2.0,
                25,
                0.03,
                Some(&mut rng),
            ),
        )
        .clone();

    let short = FitConfig {
        min_iterations: 5,
        max_iterations: 5,
        convergence_tolerance: 0.0,
        ..helix_config()
    };
    let long = FitConfig {
        min_iterations: 15,
        max_iterations: 15,
        convergence_tolerance: 0.0,
        ..helix_config()
    };
    let a = TrackFitter::new(short).unwrap().fit_track(&cand, &store);
    let b = TrackFitter::new(long).unwrap().fit_track(&cand, &store);
    assert!(a.is_fitted() && b.is_fitted());
    assert!(b.chi2 <= a.chi2 * 1.01 + 1e-9, "χ²: {} after 5, {} after 15", a.chi2, b.chi2);
}

#[test]
fn test_underdetermined_tracks() {
    init_tracing();
    let mut store = HitClusterStore::new();
    let one = store
        .add_track(1, 211, straight_track(Vector3::zeros(), Vector3::x(), 1.0, 1, 0.0, None))
        .clone();
    let empty = TrackCandidate {
        track_id: 2,
        pdg_code: 211,
        cluster_indices: Vec::new(),
    };
    let fitter = TrackFitter::new(straight_config()).unwrap();
    for cand in [&one, &empty] {
        let res = fitter.fit_track(cand, &store);
        assert_eq!(res.status, FitStatus::Failed);
        assert_eq!(res.error_kind(), Some(FitErrorKind::UnderdeterminedTrack));
        assert_eq!(res.iterations, 0);
        assert!(res.fitted_state.is_none());
    }
}

#[test]
fn test_bad_cluster_isolated_in_batch() {
    init_tracing();
    let mut store = HitClusterStore::new();
    for id in 0..4 {
        let dir = Vector3::new(1.0, 0.1 * id as f64, 0.5);
        store.add_track(id, 211, straight_track(Vector3::zeros(), dir, 2.0, 8, 0.0, None));
    }
    // Track 10: third cluster has a NaN variance
    let mut bad = straight_track(Vector3::zeros(), Vector3::y(), 2.0, 8, 0.0, None);
    bad[2].covariance = ClusterCovariance::diagonal(0.01, f64::NAN, 0.01);
    store.add_track(10, 211, bad);
    // Track 11: cluster from an unregistered detector segment
    let mut foreign = straight_track(Vector3::zeros(), Vector3::z(), 2.0, 8, 0.0, None);
    foreign[5].detector_id = 99;
    store.add_track(11, 211, foreign);

    let results = TrackFitter::new(straight_config()).unwrap().fit_tracks(&store);
    assert_eq!(results.len(), 6);
    for r in &results[..4] {
        assert_eq!(r.status, FitStatus::Converged, "track {}", r.track_id);
    }
    assert_eq!(results[4].track_id, 10);
    assert_eq!(results[4].error_kind(), Some(FitErrorKind::InvalidMeasurement));
    assert!(matches!(
        results[4].error,
        Some(gtpcfit::FitError::InvalidMeasurement { index: 2, .. })
    ));
    assert_eq!(results[5].error_kind(), Some(FitErrorKind::InvalidMeasurement));
}

#[test]
fn test_batch_matches_individual_fits() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(1234);
    let mut store = HitClusterStore::new();
    for id in 0..8 {
        let p0 = Vector3::new(0.1 + 0.02 * id as f64, 0.01 * id as f64, 0.1);
        store.add_track(
            id,
            if id % 2 == 0 { 211 } else { -211 },
            helix_track(
                Vector3::zeros(),
                p0,
                if id % 2 == 0 { 1.0 } else { -1.0 },
                0.5,
                2.0,
                20,
                0.02,
                Some(&mut rng),
            ),
        );
    }
    let fitter = TrackFitter::new(helix_config()).unwrap();
    let batch = fitter.fit_tracks(&store);
    for (cand, r) in store.candidates().iter().zip(batch.iter()) {
        let single = fitter.fit_track(cand, &store);
        assert_eq!(r.track_id, cand.track_id);
        assert_eq!(r.status, single.status);
        assert_eq!(r.chi2, single.chi2);
        assert_eq!(r.fitted_state, single.fitted_state);
    }
}

#[test]
fn test_padplane_ignores_drift_coordinate() {
    init_tracing();
    let dir = Vector3::new(1.0, 0.0, 0.4).normalize();
    // Every other cluster comes from a pad plane with a badly calibrated
    // drift (y) coordinate
    let clusters: Vec<HitCluster> = straight_track(Vector3::zeros(), dir, 2.0, 12, 0.0, None)
        .into_iter()
        .enumerate()
        .map(|(i, mut c)| {
            if i % 2 == 1 {
                c.detector_id = 1;
                c.position[1] += 5.0;
            }
            c
        })
        .collect();
    let mut store = HitClusterStore::new();
    let cand = store.add_track(1, 211, clusters).clone();

    let cfg = straight_config().with_detector(
        1,
        DetectorKind::PadPlane {
            drift_axis: Axis::Y,
        },
    );
    let res = TrackFitter::new(cfg).unwrap().fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Converged);
    assert_eq!(res.ndf, 6 * 3 + 6 * 2 - 5);
    assert!(res.chi2 < 1e-6, "χ² = {}", res.chi2);
    assert!((res.fitted_state.unwrap().direction() - dir).norm() < 1e-6);
}

#[test]
fn test_millimetre_input_matches_centimetre() {
    init_tracing();
    let p0 = Vector3::new(0.15, 0.0, 0.1);
    let clusters_cm = helix_track(Vector3::zeros(), p0, 1.0, 0.5, 2.0, 20, 0.0, None);
    let clusters_mm: Vec<HitCluster> = clusters_cm
        .iter()
        .map(|c| {
            let s = c.covariance.spatial() * 100.0;
            HitCluster::new(
                [c.position[0] * 10.0, c.position[1] * 10.0, c.position[2] * 10.0],
                ClusterCovariance::diagonal(s[(0, 0)], s[(1, 1)], s[(2, 2)]),
                0,
            )
        })
        .collect();

    let mut store_cm = HitClusterStore::new();
    store_cm.add_track(1, 211, clusters_cm);
    let mut store_mm = HitClusterStore::new();
    store_mm.add_track(1, 211, clusters_mm);

    let cm = TrackFitter::new(helix_config()).unwrap().fit_tracks(&store_cm);
    let mm_cfg = FitConfig {
        units: UnitSystem::new(LengthUnit::Millimetre),
        ..helix_config()
    };
    let mm = TrackFitter::new(mm_cfg).unwrap().fit_tracks(&store_mm);

    let p_cm = cm[0].momentum().unwrap();
    let p_mm = mm[0].momentum().unwrap();
    assert!((p_cm - p_mm).norm() < 1e-6);
    // Fitted positions are reported in cm either way
    let end = helix_point(Vector3::zeros(), p0, 1.0, 0.5, 0.0);
    assert!((mm[0].fitted_state.as_ref().unwrap().position - end).norm() < 1e-4);
}

#[test]
fn test_history_retention_and_pruning() {
    init_tracing();
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(1, 211, straight_track(Vector3::zeros(), Vector3::x(), 2.0, 6, 0.0, None))
        .clone();

    let no_history = FitConfig {
        retain_history: false,
        ..straight_config()
    };
    let res = TrackFitter::new(no_history).unwrap().fit_track(&cand, &store);
    assert!(res.states.is_empty());
    assert!(res.fitted_state.is_some());

    let mut res = TrackFitter::new(straight_config()).unwrap().fit_track(&cand, &store);
    assert_eq!(res.states.len(), 6);
    let chi2 = res.chi2;
    res.prune();
    assert_eq!(res.status, FitStatus::Pruned);
    assert!(res.states.is_empty());
    assert_eq!(res.chi2, chi2);
    assert!(res.is_fitted());
}

#[test]
fn test_negative_variance_is_invalid_measurement() {
    init_tracing();
    let mut store = HitClusterStore::new();
    let good = store
        .add_track(1, 211, straight_track(Vector3::zeros(), Vector3::x(), 2.0, 6, 0.0, None))
        .clone();
    // Non-PSD covariance on the very first cluster
    let mut clusters = straight_track(Vector3::zeros(), Vector3::z(), 2.0, 6, 0.0, None);
    clusters[0].covariance = ClusterCovariance::diagonal(0.01, -0.01, 0.01);
    let bad = store.add_track(2, 211, clusters).clone();

    let fitter = TrackFitter::new(straight_config()).unwrap();
    let results = fitter.fit_candidates(&[bad, good], &store);
    assert_eq!(results[0].error_kind(), Some(FitErrorKind::InvalidMeasurement));
    assert_eq!(results[1].status, FitStatus::Converged);
}

#[test]
fn test_insufficient_seed_data() {
    init_tracing();
    let fitter = TrackFitter::new(straight_config().with_detector(
        1,
        DetectorKind::PadPlane {
            drift_axis: Axis::Y,
        },
    ))
    .unwrap();

    // Photons cannot be fitted in a field
    let mut store = HitClusterStore::new();
    let photon = store
        .add_track(1, 22, straight_track(Vector3::zeros(), Vector3::x(), 2.0, 6, 0.0, None))
        .clone();
    let res = fitter.fit_track(&photon, &store);
    assert_eq!(res.error_kind(), Some(FitErrorKind::InsufficientSeedData));

    // A pad-plane first cluster with no drift variance is a valid measurement
    // but cannot anchor the seed covariance
    let mut clusters = straight_track(Vector3::zeros(), Vector3::x(), 2.0, 6, 0.0, None);
    clusters[0].detector_id = 1;
    clusters[0].covariance = ClusterCovariance::diagonal(0.01, 0.0, 0.01);
    let cand = store.add_track(2, 211, clusters).clone();
    let res = fitter.fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Failed);
    assert_eq!(res.error_kind(), Some(FitErrorKind::InsufficientSeedData));
}

#[test]
fn test_correlated_first_cluster_cannot_seed() {
    init_tracing();
    // The pad plane measures (y, z); the first cluster's x and y are fully
    // correlated, so its measured block is fine but its spatial covariance
    // is singular
    let fitter = TrackFitter::new(straight_config().with_detector(
        1,
        DetectorKind::PadPlane {
            drift_axis: Axis::X,
        },
    ))
    .unwrap();
    let mut clusters = straight_track(Vector3::zeros(), Vector3::z(), 2.0, 6, 0.0, None);
    clusters[0].detector_id = 1;
    clusters[0].covariance =
        ClusterCovariance::Spatial([[0.01, 0.01, 0.0], [0.01, 0.01, 0.0], [0.0, 0.0, 0.01]]);
    let mut store = HitClusterStore::new();
    let cand = store.add_track(1, 211, clusters).clone();

    let res = fitter.fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Failed);
    assert_eq!(res.error_kind(), Some(FitErrorKind::InsufficientSeedData));
    assert!(res.fitted_state.is_none());
}

#[test]
fn test_track_along_drift_axis_fails_in_estimator() {
    init_tracing();
    let mut store = HitClusterStore::new();
    store.add_track(1, 211, straight_track(Vector3::zeros(), Vector3::x(), 2.0, 6, 0.0, None));
    // Space point first, then pad-plane clusters whose drift axis is the
    // direction of flight: no closest approach exists
    let mut clusters = straight_track(Vector3::new(5.0, 5.0, 0.0), Vector3::z(), 2.0, 5, 0.0, None);
    for c in clusters.iter_mut().skip(1) {
        c.detector_id = 1;
    }
    store.add_track(2, 211, clusters);

    let cfg = straight_config().with_detector(
        1,
        DetectorKind::PadPlane {
            drift_axis: Axis::Z,
        },
    );
    let results = TrackFitter::new(cfg).unwrap().fit_tracks(&store);
    assert_eq!(results[0].status, FitStatus::Converged);
    assert_eq!(results[1].track_id, 2);
    assert_eq!(results[1].status, FitStatus::Failed);
    assert_eq!(results[1].error_kind(), Some(FitErrorKind::EstimatorFailure));
    assert!(results[1].fitted_state.is_none());
}

#[test]
fn test_noisy_helix_in_gas() {
    init_tracing();
    let p0 = Vector3::new(0.15, 0.02, 0.12);
    let mut rng = StdRng::seed_from_u64(99);
    let mut store = HitClusterStore::new();
    let cand = store
        .add_track(
            5,
            211,
            helix_track(Vector3::zeros(), p0, 1.0, 0.5, 2.0, 30, 0.05, Some(&mut rng)),
        )
        .clone();

    // Roughly an argon-based drift gas
    let cfg = FitConfig {
        material: Material::Homogeneous {
            radiation_length_cm: 1.2e4,
        },
        ..helix_config()
    };
    let res = TrackFitter::new(cfg).unwrap().fit_track(&cand, &store);
    assert_eq!(res.status, FitStatus::Converged, "{:?}", res.error);
    assert!(res.iterations >= 5);
    assert!(res.reduced_chi2().unwrap() < 5.0, "χ²/ndf = {:?}", res.reduced_chi2());
    let p = res.momentum().unwrap();
    assert!((p.norm() - p0.norm()).abs() / p0.norm() < 0.1, "p = {:?}", p);
}
