//! Clustering traits and types.

use crate::electrodes::SensorElectrodes;
use crate::hit::{RawHit, TruthHitId};
use crate::readout::ReadoutChip;
use crate::Result;
use std::collections::BTreeSet;

/// Raw hits on adjacent channels of one set of readout electrodes.
///
/// Members borrow from the event's raw hits and keep the order in which the
/// cluster grew, seed first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cluster<'a> {
    hits: Vec<&'a RawHit>,
}

impl<'a> Cluster<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster grown from a seed hit.
    pub fn from_seed(seed: &'a RawHit) -> Self {
        Self { hits: vec![seed] }
    }

    pub fn push(&mut self, hit: &'a RawHit) {
        self.hits.push(hit);
    }

    /// Number of channels in the cluster.
    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The seed, if the cluster has one.
    pub fn seed(&self) -> Option<&'a RawHit> {
        self.hits.first().copied()
    }

    pub fn hits(&self) -> &[&'a RawHit] {
        &self.hits
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a RawHit> + '_ {
        self.hits.iter().copied()
    }

    /// Readout cells of the member hits.
    pub fn cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.hits.iter().map(|hit| hit.cell())
    }

    /// Truth deposits contributing to any member.
    pub fn truth_hits(&self) -> BTreeSet<TruthHitId> {
        self.hits
            .iter()
            .flat_map(|hit| hit.truth_hits.iter().copied())
            .collect()
    }

    /// Owned copies of the members, for attaching to a reconstructed hit.
    pub fn to_raw_hits(&self) -> Vec<RawHit> {
        self.hits.iter().map(|&hit| hit.clone()).collect()
    }
}

/// Trait for clustering algorithms.
///
/// Groups the raw hits of one set of readout electrodes into clusters of
/// adjacent channels.
pub trait ClusteringAlgorithm: Send + Sync {
    /// Returns the name of the algorithm.
    fn name(&self) -> &'static str;

    /// Clusters the given hits. Every hit appears in at most one cluster.
    fn find_clusters<'a>(
        &self,
        electrodes: &dyn SensorElectrodes,
        readout_chip: &dyn ReadoutChip,
        raw_hits: &'a [RawHit],
    ) -> Result<Vec<Cluster<'a>>>;
}
