//! sisim-algorithms: Clustering and hit reconstruction for silicon sensors.
//!
//! This crate provides:
//! - **NearestNeighbor** - Seed-and-grow clustering on decoded charge
//! - **NearestNeighborRms** - The same on signal-to-noise, with a cluster threshold
//! - **StripHitMaker** / **PixelHitMaker** - Cluster centroids, resolutions and energies
//! - **TrackerHitDriver** - Digitization and hit making over every sensor of an event
//!

mod cluster_hit;
mod nearest_neighbor;
mod nearest_neighbor_rms;
mod pixel;
mod processing;
mod resolution;
mod strip;
#[cfg(test)]
mod test_support;

pub use nearest_neighbor::{NearestNeighbor, NearestNeighborConfig};
pub use nearest_neighbor_rms::{NearestNeighborRms, NearestNeighborRmsConfig};
pub use pixel::{PixelHitMaker, PixelHitMakerConfig};
pub use processing::{EventRecord, SensorPipeline, TrackerHitDriver};
pub use resolution::ClusterResolution;
pub use strip::{StripHitMaker, StripHitMakerConfig};

// Re-export core traits
pub use sisim_core::{Cluster, ClusteringAlgorithm, HitMaker};
