//! Nearest-neighbour clustering on decoded charge.
//!
//! Every hit at or above the seed threshold starts a cluster, which then
//! grows through adjacent channels at or above the neighbour threshold.
//! A channel joins at most one cluster: it is consumed the moment it is
//! queued.

use log::debug;
use sisim_core::{
    Cluster, ClusteringAlgorithm, Error, RawHit, ReadoutChip, Result, SensorElectrodes,
};
use std::collections::{HashMap, VecDeque};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rejects a seed threshold below the neighbour threshold.
pub(crate) fn check_thresholds(seed: f64, neighbor: f64) -> Result<()> {
    if seed < neighbor {
        return Err(Error::SeedBelowNeighbor { seed, neighbor });
    }
    Ok(())
}

/// Channel bookkeeping for one clustering pass.
pub(crate) struct ChannelMap<'a> {
    hits: HashMap<usize, &'a RawHit>,
    clusterable: HashMap<usize, bool>,
    seeds: Vec<usize>,
}

impl<'a> ChannelMap<'a> {
    /// Indexes `raw_hits` by cell and classifies them.
    ///
    /// `level` gives the quantity compared with the thresholds. Seeds are
    /// kept in hit order.
    pub(crate) fn new<F>(
        raw_hits: &'a [RawHit],
        seed_threshold: f64,
        neighbor_threshold: f64,
        mut level: F,
    ) -> Result<Self>
    where
        F: FnMut(&RawHit) -> Result<f64>,
    {
        let capacity = 2 * raw_hits.len();
        let mut hits = HashMap::with_capacity(capacity);
        let mut clusterable = HashMap::with_capacity(capacity);
        let mut seeds = Vec::new();

        for hit in raw_hits {
            let cell = hit.cell();
            if let Some(previous) = hits.insert(cell, hit) {
                return Err(if previous == hit {
                    Error::DuplicateHit(cell)
                } else {
                    Error::DuplicateChannel(cell)
                });
            }
            let level = level(hit)?;
            clusterable.insert(cell, level >= neighbor_threshold);
            if level >= seed_threshold {
                seeds.push(cell);
            }
        }

        Ok(Self {
            hits,
            clusterable,
            seeds,
        })
    }

    /// Grows a cluster from every seed still available, in seed order.
    pub(crate) fn grow_clusters(
        &mut self,
        electrodes: &dyn SensorElectrodes,
    ) -> Vec<Cluster<'a>> {
        let seeds = std::mem::take(&mut self.seeds);
        seeds
            .into_iter()
            .filter_map(|seed| self.grow(seed, electrodes))
            .collect()
    }

    fn grow(
        &mut self,
        seed: usize,
        electrodes: &dyn SensorElectrodes,
    ) -> Option<Cluster<'a>> {
        if !self.take(seed) {
            return None;
        }
        let mut cluster = Cluster::from_seed(self.hits.get(&seed).copied()?);
        let mut unchecked = VecDeque::from([seed]);
        while let Some(cell) = unchecked.pop_front() {
            for neighbor in electrodes.nearest_neighbor_cells(cell) {
                if self.take(neighbor) {
                    if let Some(&hit) = self.hits.get(&neighbor) {
                        cluster.push(hit);
                    }
                    unchecked.push_back(neighbor);
                }
            }
        }
        Some(cluster)
    }

    /// Marks a channel as used, returning whether it was still available.
    fn take(&mut self, cell: usize) -> bool {
        self.clusterable
            .get_mut(&cell)
            .is_some_and(|available| std::mem::replace(available, false))
    }
}

/// Thresholds for [`NearestNeighbor`], in electrons.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NearestNeighborConfig {
    /// Minimum signal to start a cluster (default: 4000).
    pub seed_threshold: f64,
    /// Minimum signal to join a cluster (default: 2000).
    pub neighbor_threshold: f64,
}

impl Default for NearestNeighborConfig {
    fn default() -> Self {
        Self {
            seed_threshold: 4000.0,
            neighbor_threshold: 2000.0,
        }
    }
}

impl NearestNeighborConfig {
    #[must_use]
    pub fn with_thresholds(mut self, seed: f64, neighbor: f64) -> Self {
        self.seed_threshold = seed;
        self.neighbor_threshold = neighbor;
        self
    }
}

/// Seed-and-grow clustering with thresholds on decoded charge.
#[derive(Clone, Debug, Default)]
pub struct NearestNeighbor {
    config: NearestNeighborConfig,
}

impl NearestNeighbor {
    /// Creates the algorithm, failing when the seed threshold is below the
    /// neighbour threshold.
    pub fn new(config: NearestNeighborConfig) -> Result<Self> {
        check_thresholds(config.seed_threshold, config.neighbor_threshold)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NearestNeighborConfig {
        &self.config
    }
}

impl ClusteringAlgorithm for NearestNeighbor {
    fn name(&self) -> &'static str {
        "NearestNeighbor"
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
            |hit| readout_chip.decode_charge(hit),
        )?;
        let clusters = channels.grow_clusters(electrodes);
        debug!(
            "{}: {} clusters from {} hits",
            self.name(),
            clusters.len(),
            raw_hits.len()
        );
        Ok(clusters)
    }
}
