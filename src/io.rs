//! CSV exchange of clusters and fit results.
//!
//! Cluster files carry one cluster per row:
//!
//! ```text
//! track_id,detector_id,x,y,z,cxx,cxy,cxz,cyy,cyz,czz
//! ```
//!
//! Rows of the same track must appear in propagation order; tracks may be
//! interleaved. Positions and covariances are in the length unit configured
//! by [`UnitSystem`](crate::units::UnitSystem).

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::fitter::FitResult;
use crate::store::HitClusterStore;
use crate::{ClusterCovariance, HitCluster};

const CLUSTER_COLUMNS: usize = 11;

fn parse_field<T: std::str::FromStr>(record: &csv::StringRecord, col: usize, line: u64) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let field = record.get(col).unwrap_or("").trim();
    field
        .parse()
        .with_context(|| format!("line {}: cannot parse column {} ({:?})", line, col, field))
}

/// Read a cluster CSV into a store, assigning every track the given PDG code.
pub fn read_clusters_csv<P: AsRef<Path>>(file: P, pdg_code: i32) -> anyhow::Result<HitClusterStore> {
    let mut rdr = csv::Reader::from_path(file.as_ref())
        .with_context(|| format!("cannot open {}", file.as_ref().display()))?;

    let mut order: Vec<i32> = Vec::new();
    let mut tracks: HashMap<i32, Vec<HitCluster>> = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        anyhow::ensure!(
            record.len() >= CLUSTER_COLUMNS,
            "line {}: expected {} columns, found {}",
            line,
            CLUSTER_COLUMNS,
            record.len()
        );
        let track_id: i32 = parse_field(&record, 0, line)?;
        let detector_id: i32 = parse_field(&record, 1, line)?;
        let mut v = [0.0f64; 9];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = parse_field(&record, i + 2, line)?;
        }
        let [x, y, z, cxx, cxy, cxz, cyy, cyz, czz] = v;
        let cluster = HitCluster::new(
            [x, y, z],
            ClusterCovariance::Spatial([[cxx, cxy, cxz], [cxy, cyy, cyz], [cxz, cyz, czz]]),
            detector_id,
        );
        tracks
            .entry(track_id)
            .or_insert_with(|| {
                order.push(track_id);
                Vec::new()
            })
            .push(cluster);
    }

    let mut store = HitClusterStore::new();
    for track_id in order {
        if let Some(clusters) = tracks.remove(&track_id) {
            store.add_track(track_id, pdg_code, clusters);
        }
    }
    info!(
        "Read {} clusters in {} tracks from {}",
        store.num_clusters(),
        store.candidates().len(),
        file.as_ref().display()
    );
    Ok(store)
}

/// Write one row per fit result.
///
/// Failed fits leave the state columns empty and carry the error message.
pub fn write_fit_results_csv<P: AsRef<Path>>(file: P, results: &[FitResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(file.as_ref())
        .with_context(|| format!("cannot create {}", file.as_ref().display()))?;
    wtr.write_record([
        "track_id", "status", "chi2", "ndf", "iterations", "charge", "x", "y", "z", "px", "py", "pz",
        "fit_time_ms", "error",
    ])?;
    for r in results {
        let mut row = vec![
            r.track_id.to_string(),
            format!("{:?}", r.status),
            r.chi2.to_string(),
            r.ndf.to_string(),
            r.iterations.to_string(),
            r.charge.to_string(),
        ];
        match &r.fitted_state {
            Some(s) => row.extend(
                s.position
                    .iter()
                    .chain(s.momentum.iter())
                    .map(|v| v.to_string()),
            ),
            None => row.extend((0..6).map(|_| String::new())),
        }
        row.push(r.fit_time_ms.to_string());
        row.push(r.error.as_ref().map(|e| e.to_string()).unwrap_or_default());
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}
