//! Two-dimensional hits from pixel clusters.

use crate::cluster_hit;
use crate::{ClusterResolution, NearestNeighbor};
use log::debug;
use nalgebra::Vector3;
use sisim_core::silicon::ENERGY_EHPAIR;
use sisim_core::{
    Cluster, ClusteringAlgorithm, ElectrodeKind, HitKind, HitMaker, RawHit, ReadoutChip,
    ReconstructedHit, Result, Sensor, SensorElectrodes, SensorSimulation,
};
use std::collections::BTreeSet;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel hit making configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelHitMakerConfig {
    /// Larger clusters are dropped (default: 10).
    pub max_cluster_npixels: usize,
    /// Per-axis resolution by the number of distinct rows or columns.
    pub resolution: ClusterResolution,
}

impl Default for PixelHitMakerConfig {
    fn default() -> Self {
        Self {
            max_cluster_npixels: 10,
            resolution: ClusterResolution::default(),
        }
    }
}

impl PixelHitMakerConfig {
    #[must_use]
    pub fn with_max_cluster_size(mut self, max_cluster_npixels: usize) -> Self {
        self.max_cluster_npixels = max_cluster_npixels;
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: ClusterResolution) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Clusters pixel hits and converts each cluster into a 2D hit.
pub struct PixelHitMaker {
    name: String,
    config: PixelHitMakerConfig,
    simulation: Box<dyn SensorSimulation>,
    readout_chip: Arc<dyn ReadoutChip>,
    clustering: Box<dyn ClusteringAlgorithm>,
}

impl PixelHitMaker {
    /// Creates a hit maker using [`NearestNeighbor`] with default thresholds.
    pub fn new(simulation: Box<dyn SensorSimulation>, readout_chip: Arc<dyn ReadoutChip>) -> Self {
        Self {
            name: "PixelClusterer".to_string(),
            config: PixelHitMakerConfig::default(),
            simulation,
            readout_chip,
            clustering: Box::new(NearestNeighbor::default()),
        }
    }

    #[must_use]
    pub fn with_clustering(mut self, clustering: Box<dyn ClusteringAlgorithm>) -> Self {
        self.clustering = clustering;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: PixelHitMakerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &PixelHitMakerConfig {
        &self.config
    }

    /// Makes hits from the raw hits of one set of pixel electrodes.
    pub fn make_electrode_hits(
        &self,
        sensor: &Sensor,
        electrodes: &dyn SensorElectrodes,
        raw_hits: &[RawHit],
    ) -> Result<Vec<ReconstructedHit>> {
        let clusters =
            self.clustering
                .find_clusters(electrodes, self.readout_chip.as_ref(), raw_hits)?;
        let mut hits = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            if cluster.len() > self.config.max_cluster_npixels {
                debug!(
                    "{}: dropping {}-pixel cluster on sensor {}",
                    self.name,
                    cluster.len(),
                    sensor.id()
                );
                continue;
            }
            hits.push(self.make_hit(sensor, electrodes, cluster)?);
        }
        Ok(hits)
    }

    fn make_hit(
        &self,
        sensor: &Sensor,
        electrodes: &dyn SensorElectrodes,
        cluster: &Cluster<'_>,
    ) -> Result<ReconstructedHit> {
        let members = cluster_hit::decode(cluster, self.readout_chip.as_ref())?;

        let weighted: Vec<_> = members
            .iter()
            .map(|member| (electrodes.cell_position(member.cell), member.charge))
            .collect();
        let local = cluster_hit::weighted_centroid(&weighted);
        let position =
            cluster_hit::global_position(sensor, electrodes, self.simulation.as_ref(), &local)?;

        let rows: BTreeSet<usize> = cluster.cells().map(|c| electrodes.row_number(c)).collect();
        let columns: BTreeSet<usize> = cluster
            .cells()
            .map(|c| electrodes.column_number(c))
            .collect();
        let resolution = &self.config.resolution;
        let sigma_x =
            resolution.resolution(rows.len(), cluster_hit::sense_pitch(sensor, electrodes, 0));
        let sigma_y =
            resolution.resolution(columns.len(), cluster_hit::sense_pitch(sensor, electrodes, 1));
        let covariance = cluster_hit::global_covariance(
            sensor,
            electrodes,
            Vector3::new(sigma_x.powi(2), sigma_y.powi(2), 0.0),
        );

        Ok(ReconstructedHit {
            position,
            covariance,
            energy: cluster_hit::total_charge(&members) * ENERGY_EHPAIR,
            time: cluster_hit::weighted_time(&members),
            kind: HitKind::Pixel,
            raw_hits: cluster.to_raw_hits(),
        })
    }
}

impl HitMaker for PixelHitMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn hit_kind(&self) -> HitKind {
        HitKind::Pixel
    }

    fn make_hits(
        &mut self,
        sensor: &Arc<Sensor>,
        raw_hits: &[RawHit],
    ) -> Result<Vec<ReconstructedHit>> {
        self.simulation.set_sensor(Arc::clone(sensor));
        let mut hits = Vec::new();
        for carrier in sensor.carriers() {
            let electrodes = sensor.require_readout_electrodes(carrier)?;
            if electrodes.kind() != ElectrodeKind::Pixels {
                continue;
            }
            let side_hits = cluster_hit::side_hits(sensor, carrier, raw_hits);
            if side_hits.is_empty() {
                continue;
            }
            hits.extend(self.make_electrode_hits(sensor, electrodes, &side_hits)?);
        }
        debug!(
            "{}: sensor {} produced {} pixel hits from {} raw hits",
            self.name,
            sensor.id(),
            hits.len(),
            raw_hits.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::UnitChip;
    use crate::NearestNeighborConfig;
    use approx::assert_relative_eq;
    use sisim_core::{surface_frame, ChannelId, ChargeCarrier, Pixels, SensorId};
    use sisim_digi::CdfSensorSim;

    const THICKNESS: f64 = 0.2;

    fn sensor() -> Arc<Sensor> {
        // 0.05 x 0.4 mm pixels, 16 x 8.
        let pixels = Pixels::new(
            ChargeCarrier::Electron,
            16,
            8,
            0.05,
            0.4,
            surface_frame(ChargeCarrier::Electron, THICKNESS, 0.0),
        )
        .unwrap();
        Arc::new(
            Sensor::builder(SensorId(7), THICKNESS)
                .with_sense_electrodes(Box::new(pixels))
                .build()
                .unwrap(),
        )
    }

    fn pixel_hit(row: usize, column: usize, charge: i32) -> RawHit {
        let channel = ChannelId {
            sensor: SensorId(7),
            side: ChargeCarrier::Electron,
            cell: row * 8 + column,
        };
        RawHit::new(channel, vec![charge], 0)
    }

    fn maker() -> PixelHitMaker {
        let clustering =
            NearestNeighbor::new(NearestNeighborConfig::default().with_thresholds(1000.0, 500.0))
                .unwrap();
        PixelHitMaker::new(Box::new(CdfSensorSim::new()), Arc::new(UnitChip::new(100.0)))
            .with_clustering(Box::new(clustering))
    }

    #[test]
    fn test_resolution_per_axis() {
        // Two rows, one column.
        let raw_hits = vec![pixel_hit(7, 3, 3000), pixel_hit(8, 3, 3000)];
        let hits = maker().make_hits(&sensor(), &raw_hits).unwrap();

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.kind, HitKind::Pixel);
        assert_relative_eq!(hit.position.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hit.position.y, -0.2, epsilon = 1e-12);
        assert_relative_eq!(hit.position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hit.covariance[(0, 0)].sqrt(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(
            hit.covariance[(1, 1)].sqrt(),
            0.4 / 12.0_f64.sqrt(),
            epsilon = 1e-12
        );
        assert_relative_eq!(hit.energy, 6000.0 * ENERGY_EHPAIR, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_pixels_cluster_together() {
        let raw_hits = vec![
            pixel_hit(2, 2, 4000),
            pixel_hit(3, 3, 1000),
            pixel_hit(4, 4, 1000),
            pixel_hit(10, 6, 2000),
        ];
        let hits = maker().make_hits(&sensor(), &raw_hits).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].raw_hits.len(), 3);
        // Three distinct rows and columns.
        assert_relative_eq!(hits[0].covariance[(0, 0)].sqrt(), 0.05 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(hits[0].covariance[(1, 1)].sqrt(), 0.4 / 3.0, epsilon = 1e-12);
        assert_eq!(hits[1].raw_hits.len(), 1);
    }

    #[test]
    fn test_oversized_clusters_dropped() {
        let raw_hits: Vec<RawHit> = (0..4)
            .flat_map(|row| (0..3).map(move |column| pixel_hit(row, column, 5000)))
            .collect();
        let mut maker = maker();
        assert!(maker.make_hits(&sensor(), &raw_hits).unwrap().is_empty());

        let mut maker = maker.with_config(PixelHitMakerConfig::default().with_max_cluster_size(12));
        assert_eq!(maker.make_hits(&sensor(), &raw_hits).unwrap().len(), 1);
        assert_eq!(maker.collection_name(), "PixelClusterer_SiTrackerHitPixel");
    }
}
