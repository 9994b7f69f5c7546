//! Nearest-neighbour clustering on signal-to-noise.

use crate::nearest_neighbor::{check_thresholds, ChannelMap};
use log::debug;
use sisim_core::{Cluster, ClusteringAlgorithm, RawHit, ReadoutChip, Result, SensorElectrodes};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Thresholds for [`NearestNeighborRms`], in units of the channel noise RMS.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NearestNeighborRmsConfig {
    /// Minimum signal/noise to start a cluster (default: 4).
    pub seed_threshold: f64,
    /// Minimum signal/noise to join a cluster (default: 3).
    pub neighbor_threshold: f64,
    /// Minimum summed signal over quadrature-summed noise (default: 4).
    pub cluster_threshold: f64,
}

impl Default for NearestNeighborRmsConfig {
    fn default() -> Self {
        Self {
            seed_threshold: 4.0,
            neighbor_threshold: 3.0,
            cluster_threshold: 4.0,
        }
    }
}

impl NearestNeighborRmsConfig {
    #[must_use]
    pub fn with_thresholds(mut self, seed: f64, neighbor: f64, cluster: f64) -> Self {
        self.seed_threshold = seed;
        self.neighbor_threshold = neighbor;
        self.cluster_threshold = cluster;
        self
    }
}

/// Nearest-neighbour clustering with thresholds relative to channel noise.
///
/// A grown cluster is kept only when its total signal divided by the
/// quadrature sum of member noise exceeds the cluster threshold.
#[derive(Clone, Debug, Default)]
pub struct NearestNeighborRms {
    config: NearestNeighborRmsConfig,
}

impl NearestNeighborRms {
    pub fn new(config: NearestNeighborRmsConfig) -> Result<Self> {
        check_thresholds(config.seed_threshold, config.neighbor_threshold)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NearestNeighborRmsConfig {
        &self.config
    }

    fn significance(
        cluster: &Cluster<'_>,
        electrodes: &dyn SensorElectrodes,
        readout_chip: &dyn ReadoutChip,
    ) -> Result<f64> {
        let mut signal = 0.0;
        let mut noise_squared = 0.0;
        for hit in cluster.iter() {
            signal += readout_chip.decode_charge(hit)?;
            noise_squared += readout_chip.noise_rms(electrodes, hit.cell()).powi(2);
        }
        Ok(signal / noise_squared.sqrt())
    }
}

impl ClusteringAlgorithm for NearestNeighborRms {
    fn name(&self) -> &'static str {
        "NearestNeighborRMS"
    }

    fn find_clusters<'a>(
        &self,
        electrodes: &dyn SensorElectrodes,
        readout_chip: &dyn ReadoutChip,
        raw_hits: &'a [RawHit],
    ) -> Result<Vec<Cluster<'a>>> {
        let mut channels = ChannelMap::new(
            raw_hits,
            self.config.seed_threshold,
            self.config.neighbor_threshold,
            |hit| {
                let signal = readout_chip.decode_charge(hit)?;
                Ok(signal / readout_chip.noise_rms(electrodes, hit.cell()))
            },
        )?;

        let mut clusters = Vec::new();
        for cluster in channels.grow_clusters(electrodes) {
            if Self::significance(&cluster, electrodes, readout_chip)? > self.config.cluster_threshold
            {
                clusters.push(cluster);
            }
        }
        debug!(
            "{}: {} clusters from {} hits",
            self.name(),
            clusters.len(),
            raw_hits.len()
        );
        Ok(clusters)
    }
}
