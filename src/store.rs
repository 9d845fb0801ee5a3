//! Hit cluster store: owns the clusters of an event and the per-track
//! ordering produced by track finding.
//!
//! Clusters live in one flat arena; a [`TrackCandidate`] refers to them by
//! index, in the order the estimator must visit them. The store is built once
//! per event and only read during fitting, so it can be shared across worker
//! threads without locking.

use rkyv::{Archive, Deserialize, Serialize};
use tracing::{info, warn};

use crate::units::UnitSystem;
use crate::HitCluster;

/// The clusters believed to originate from one particle.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct TrackCandidate {
    /// Caller-assigned track identifier.
    pub track_id: i32,
    /// PDG code selecting the particle hypothesis (charge and mass).
    pub pdg_code: i32,
    /// Indices into the store's cluster arena, in propagation order.
    pub cluster_indices: Vec<u32>,
}

impl TrackCandidate {
    pub fn len(&self) -> usize {
        self.cluster_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cluster_indices.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct HitClusterStore {
    clusters: Vec<HitCluster>,
    candidates: Vec<TrackCandidate>,
}

impl HitClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cluster to the arena and return its index.
    pub fn push_cluster(&mut self, cluster: HitCluster) -> u32 {
        self.clusters.push(cluster);
        (self.clusters.len() - 1) as u32
    }

    /// Register a track made of already-stored clusters.
    pub fn push_candidate(&mut self, candidate: TrackCandidate) {
        self.candidates.push(candidate);
    }

    /// Store a track's clusters (in propagation order) and register the
    /// candidate that references them.
    pub fn add_track<I>(&mut self, track_id: i32, pdg_code: i32, clusters: I) -> &TrackCandidate
    where
        I: IntoIterator<Item = HitCluster>,
    {
        let cluster_indices = clusters
            .into_iter()
            .map(|c| self.push_cluster(c))
            .collect();
        self.candidates.push(TrackCandidate {
            track_id,
            pdg_code,
            cluster_indices,
        });
        &self.candidates[self.candidates.len() - 1]
    }

    pub fn cluster(&self, index: u32) -> Option<&HitCluster> {
        self.clusters.get(index as usize)
    }

    pub fn clusters(&self) -> &[HitCluster] {
        &self.clusters
    }

    pub fn candidates(&self) -> &[TrackCandidate] {
        &self.candidates
    }

    pub fn candidate(&self, track_id: i32) -> Option<&TrackCandidate> {
        self.candidates.iter().find(|c| c.track_id == track_id)
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Check that a candidate's clusters advance monotonically along the
    /// chord from its first to its last cluster.
    ///
    /// The seed's direction assumption depends on this ordering. Returns
    /// `true` for candidates too short to judge or with dangling indices
    /// (those are reported by the fit itself).
    pub fn is_monotonic(&self, candidate: &TrackCandidate, units: &UnitSystem) -> bool {
        let positions: Option<Vec<_>> = candidate
            .cluster_indices
            .iter()
            .map(|&i| self.cluster(i).map(|c| c.position_cm(units)))
            .collect();
        let Some(positions) = positions else {
            return true;
        };
        if positions.len() < 3 {
            return true;
        }
        let chord = positions[positions.len() - 1] - positions[0];
        if chord.norm() == 0.0 {
            return true;
        }
        let axis = chord.normalize();
        let proj: Vec<f64> = positions.iter().map(|p| (p - positions[0]).dot(&axis)).collect();
        let monotonic = proj.windows(2).all(|w| w[1] >= w[0]);
        if !monotonic {
            warn!(
                "Track {}: clusters are not ordered along the first-to-last chord",
                candidate.track_id
            );
        }
        monotonic
    }
}

// ── Serialization ───────────────────────────────────────────────────────────

impl HitClusterStore {
    /// Serialize the store to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the store to a file using rkyv.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved cluster store to {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Deserialize a store from rkyv bytes of any alignment.
    pub fn from_rkyv_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))
    }

    /// Load a store from an rkyv file.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let store = Self::from_rkyv_bytes(&bytes)?;
        info!(
            "Loaded cluster store: {} clusters, {} tracks",
            store.clusters.len(),
            store.candidates.len()
        );
        Ok(store)
    }
}
