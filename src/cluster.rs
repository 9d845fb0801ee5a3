//! Define a hit cluster: the reduced position of a group of TPC hits
//! attributed to one point along a particle track.
//! Clusters are the output of the external clustering stage and the input to the track fit.
//!

use rkyv::{Archive, Deserialize, Serialize};

use crate::units::UnitSystem;
use crate::Matrix3;
use crate::Vector3;

/// Positional uncertainty of a cluster.
///
/// Producers either report the spatial 3×3 covariance directly, or a full 6×6
/// covariance whose leading 3×3 block is spatial. Entries are in the producer's
/// length unit squared.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum ClusterCovariance {
    Spatial([[f64; 3]; 3]),
    Full([[f64; 6]; 6]),
}

impl ClusterCovariance {
    /// Diagonal spatial covariance from per-axis variances.
    pub fn diagonal(var_x: f64, var_y: f64, var_z: f64) -> Self {
        ClusterCovariance::Spatial([[var_x, 0.0, 0.0], [0.0, var_y, 0.0], [0.0, 0.0, var_z]])
    }

    /// Dimension of the reported matrix (3 or 6).
    pub fn dim(&self) -> usize {
        match self {
            ClusterCovariance::Spatial(_) => 3,
            ClusterCovariance::Full(_) => 6,
        }
    }

    /// Leading spatial 3×3 block, in the producer's units.
    pub fn spatial(&self) -> Matrix3 {
        match self {
            ClusterCovariance::Spatial(m) => Matrix3::from_fn(|i, j| m[i][j]),
            ClusterCovariance::Full(m) => Matrix3::from_fn(|i, j| m[i][j]),
        }
    }

    /// Iterate over every stored entry as (row, col, value).
    pub(crate) fn entries(&self) -> Vec<(usize, usize, f64)> {
        let n = self.dim();
        let mut out = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                let v = match self {
                    ClusterCovariance::Spatial(m) => m[i][j],
                    ClusterCovariance::Full(m) => m[i][j],
                };
                out.push((i, j, v));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct HitCluster {
    /// Cluster position `[x, y, z]` in the producer's length unit.
    pub position: [f64; 3],
    /// Positional uncertainty.
    pub covariance: ClusterCovariance,
    /// Detector segment that produced the cluster. Selects the measurement
    /// model the estimator applies to it.
    pub detector_id: i32,
}

impl HitCluster {
    pub fn new(position: [f64; 3], covariance: ClusterCovariance, detector_id: i32) -> Self {
        Self {
            position,
            covariance,
            detector_id,
        }
    }

    /// Position converted to centimetres.
    pub fn position_cm(&self, units: &UnitSystem) -> Vector3 {
        Vector3::new(
            units.length_to_cm(self.position[0]),
            units.length_to_cm(self.position[1]),
            units.length_to_cm(self.position[2]),
        )
    }

    /// Spatial covariance converted to cm².
    pub fn spatial_covariance_cm2(&self, units: &UnitSystem) -> Matrix3 {
        self.covariance.spatial().map(|v| units.variance_to_cm2(v))
    }

    /// True when every coordinate and covariance entry is finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.covariance.entries().iter().all(|(_, _, v)| v.is_finite())
    }
}
