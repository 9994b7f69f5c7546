//! One-dimensional hits from strip clusters.
#![allow(clippy::cast_precision_loss)]

use crate::cluster_hit::{self, DecodedHit};
use crate::{ClusterResolution, NearestNeighbor};
use log::debug;
use nalgebra::Vector3;
use sisim_core::silicon::ENERGY_EHPAIR;
use sisim_core::{
    Cluster, ClusteringAlgorithm, ElectrodeKind, HitKind, HitMaker, RawHit, ReadoutChip,
    ReconstructedHit, Result, Sensor, SensorElectrodes, SensorSimulation,
};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Strip hit making configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripHitMakerConfig {
    /// Clusters wider than this share the interior charge evenly (default: 4).
    pub max_noaverage_nstrips: usize,
    /// Larger clusters are dropped (default: 10).
    pub max_cluster_nstrips: usize,
    /// Measured-coordinate resolution by cluster width.
    pub resolution: ClusterResolution,
}

impl Default for StripHitMakerConfig {
    fn default() -> Self {
        Self {
            max_noaverage_nstrips: 4,
            max_cluster_nstrips: 10,
            resolution: ClusterResolution::default(),
        }
    }
}

impl StripHitMakerConfig {
    #[must_use]
    pub fn with_max_cluster_size(mut self, max_cluster_nstrips: usize) -> Self {
        self.max_cluster_nstrips = max_cluster_nstrips;
        self
    }

    #[must_use]
    pub fn with_central_averaging(mut self, max_noaverage_nstrips: usize) -> Self {
        self.max_noaverage_nstrips = max_noaverage_nstrips;
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: ClusterResolution) -> Self {
        self.resolution = resolution;
        self
    }
}

/// Clusters strip hits and converts each cluster into a 1D hit.
///
/// The position is the charge-weighted strip centre, swum back to the
/// sensor mid-plane along the drift line and placed in the global frame.
pub struct StripHitMaker {
    name: String,
    config: StripHitMakerConfig,
    simulation: Box<dyn SensorSimulation>,
    readout_chip: Arc<dyn ReadoutChip>,
    clustering: Box<dyn ClusteringAlgorithm>,
}

impl StripHitMaker {
    /// Creates a hit maker using [`NearestNeighbor`] with default thresholds.
    pub fn new(simulation: Box<dyn SensorSimulation>, readout_chip: Arc<dyn ReadoutChip>) -> Self {
        Self {
            name: "StripClusterer".to_string(),
            config: StripHitMakerConfig::default(),
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
    pub fn with_config(mut self, config: StripHitMakerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(&self) -> &StripHitMakerConfig {
        &self.config
    }

    pub fn clustering(&self) -> &dyn ClusteringAlgorithm {
        self.clustering.as_ref()
    }

    /// Makes hits from the raw hits of one set of strip electrodes.
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
            if cluster.len() > self.config.max_cluster_nstrips {
                debug!(
                    "{}: dropping {}-strip cluster on sensor {}",
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
        let mut members = cluster_hit::decode(cluster, self.readout_chip.as_ref())?;
        members.sort_by_key(|member| member.cell);

        let local = cluster_hit::weighted_centroid(
            &self
                .averaged_signals(&members)
                .into_iter()
                .zip(&members)
                .map(|(signal, member)| (electrodes.cell_position(member.cell), signal))
                .collect::<Vec<_>>(),
        );
        let position =
            cluster_hit::global_position(sensor, electrodes, self.simulation.as_ref(), &local)?;

        let pitch = cluster_hit::sense_pitch(sensor, electrodes, 0);
        let measured = self.config.resolution.resolution(members.len(), pitch);
        let length = members
            .iter()
            .map(|member| electrodes.cell_length(member.cell))
            .fold(0.0, f64::max);
        let unmeasured = length / 12.0_f64.sqrt();
        let covariance = cluster_hit::global_covariance(
            sensor,
            electrodes,
            Vector3::new(measured.powi(2), unmeasured.powi(2), 0.0),
        );

        Ok(ReconstructedHit {
            position,
            covariance,
            energy: cluster_hit::total_charge(&members) * ENERGY_EHPAIR,
            time: cluster_hit::weighted_time(&members),
            kind: HitKind::Strip1D,
            raw_hits: cluster.to_raw_hits(),
        })
    }

    /// Signals used for the centroid. Above `max_noaverage_nstrips`, the
    /// interior strips all carry their mean signal.
    fn averaged_signals(&self, members: &[DecodedHit]) -> Vec<f64> {
        let mut signals: Vec<f64> = members.iter().map(|member| member.charge).collect();
        let n = signals.len();
        if n > self.config.max_noaverage_nstrips && n > 2 {
            let interior = &mut signals[1..n - 1];
            let mean = interior.iter().sum::<f64>() / interior.len() as f64;
            interior.fill(mean);
        }
        signals
    }
}

impl HitMaker for StripHitMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn hit_kind(&self) -> HitKind {
        HitKind::Strip1D
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
            if electrodes.kind() != ElectrodeKind::Strips {
                continue;
            }
            let side_hits = cluster_hit::side_hits(sensor, carrier, raw_hits);
            if side_hits.is_empty() {
                continue;
            }
            hits.extend(self.make_electrode_hits(sensor, electrodes, &side_hits)?);
        }
        debug!(
            "{}: sensor {} produced {} strip hits from {} raw hits",
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
    use crate::test_support::{strip_hit, UnitChip};
    use crate::NearestNeighborConfig;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use sisim_core::{surface_frame, ChargeCarrier, SensorId, Strips};
    use sisim_digi::CdfSensorSim;

    const THICKNESS: f64 = 0.3;
    const PITCH: f64 = 0.05;

    fn sensor() -> Arc<Sensor> {
        let strips = Strips::new(
            ChargeCarrier::Hole,
            64,
            PITCH,
            20.0,
            surface_frame(ChargeCarrier::Hole, THICKNESS, 0.0),
        )
        .unwrap();
        Arc::new(
            Sensor::builder(SensorId(0), THICKNESS)
                .with_sense_electrodes(Box::new(strips))
                .build()
                .unwrap(),
        )
    }

    fn maker() -> StripHitMaker {
        let clustering =
            NearestNeighbor::new(NearestNeighborConfig::default().with_thresholds(1000.0, 500.0))
                .unwrap();
        StripHitMaker::new(Box::new(CdfSensorSim::new()), Arc::new(UnitChip::new(100.0)))
            .with_clustering(Box::new(clustering))
    }

    fn strip_center(cell: usize) -> f64 {
        (cell as f64 - 31.5) * PITCH
    }

    #[test]
    fn test_three_strip_cluster() {
        let sensor = sensor();
        let raw_hits = vec![strip_hit(30, 2000), strip_hit(31, 6000), strip_hit(32, 2000)];
        let hits = maker().make_hits(&sensor, &raw_hits).unwrap();

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.kind, HitKind::Strip1D);
        assert_relative_eq!(hit.position.x, strip_center(31), epsilon = 1e-12);
        assert_relative_eq!(hit.position.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(hit.covariance[(0, 0)].sqrt(), PITCH / 3.0, epsilon = 1e-12);
        assert_relative_eq!(
            hit.covariance[(1, 1)].sqrt(),
            20.0 / 12.0_f64.sqrt(),
            epsilon = 1e-9
        );
        assert_relative_eq!(hit.covariance[(2, 2)], 0.0);
        assert_relative_eq!(hit.energy, 10_000.0 * ENERGY_EHPAIR, epsilon = 1e-12);
        assert_eq!(hit.raw_hits.len(), 3);
    }

    #[test]
    fn test_wide_cluster_averages_interior() {
        let sensor = sensor();
        // Interior strips 21..=24 average to 3000 each; the ends weigh 1000 and 5000.
        let charges = [1000, 2000, 5000, 1000, 4000, 5000];
        let raw_hits: Vec<RawHit> = charges
            .iter()
            .enumerate()
            .map(|(i, charge)| strip_hit(20 + i, *charge))
            .collect();
        let hits = maker().make_hits(&sensor, &raw_hits).unwrap();

        assert_eq!(hits.len(), 1);
        let weights = [1000.0, 3000.0, 3000.0, 3000.0, 3000.0, 5000.0];
        let expected = weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * strip_center(20 + i))
            .sum::<f64>()
            / weights.iter().sum::<f64>();
        assert_relative_eq!(hits[0].position.x, expected, epsilon = 1e-12);
        assert_relative_eq!(hits[0].covariance[(0, 0)].sqrt(), PITCH, epsilon = 1e-12);
    }

    #[test]
    fn test_oversized_clusters_dropped() {
        let sensor = sensor();
        let raw_hits: Vec<RawHit> = (10..22).map(|cell| strip_hit(cell, 5000)).collect();
        let mut maker = maker();
        assert!(maker.make_hits(&sensor, &raw_hits).unwrap().is_empty());

        let mut maker = maker.with_config(StripHitMakerConfig::default().with_max_cluster_size(12));
        assert_eq!(maker.make_hits(&sensor, &raw_hits).unwrap().len(), 1);
    }

    #[test]
    fn test_hits_in_global_frame() {
        let strips = Strips::new(
            ChargeCarrier::Hole,
            64,
            PITCH,
            20.0,
            surface_frame(ChargeCarrier::Hole, THICKNESS, 0.0),
        )
        .unwrap();
        let placement = nalgebra::Isometry3::translation(0.0, 0.0, 100.0);
        let sensor = Arc::new(
            Sensor::builder(SensorId(3), THICKNESS)
                .with_placement(placement)
                .with_sense_electrodes(Box::new(strips))
                .build()
                .unwrap(),
        );
        let channel = |cell| sisim_core::ChannelId {
            sensor: SensorId(3),
            side: ChargeCarrier::Hole,
            cell,
        };
        let raw_hits = vec![
            RawHit::new(channel(40), vec![3000], 4),
            RawHit::new(channel(41), vec![1000], 8),
            // Another sensor's hit is ignored.
            strip_hit(5, 9000),
        ];
        let hits = maker().make_hits(&sensor, &raw_hits).unwrap();

        assert_eq!(hits.len(), 1);
        let expected_x = 0.75 * strip_center(40) + 0.25 * strip_center(41);
        assert_relative_eq!(
            hits[0].position,
            Point3::new(expected_x, 0.0, 100.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(hits[0].time, 5.0);
        assert_eq!(maker().collection_name(), "StripClusterer_SiTrackerHitStrip1D");
    }
}
