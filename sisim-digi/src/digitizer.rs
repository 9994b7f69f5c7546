//! Sensor-level digitization into raw hits.

use log::debug;
use rand::RngCore;
use sisim_core::{
    ChannelId, Digitizer, RawHit, ReadoutChip, Result, Sensor, SensorSimulation, TruthHit,
};
use std::sync::Arc;

/// Runs a transport simulation and a readout chip over one sensor at a time.
///
/// Every raw hit is stamped with time 0 and carries the truth hits that
/// contributed charge to its channel; pure noise hits carry none.
pub struct RawHitMaker {
    name: String,
    simulation: Box<dyn SensorSimulation>,
    readout_chip: Arc<dyn ReadoutChip>,
}

impl RawHitMaker {
    pub fn new(simulation: Box<dyn SensorSimulation>, readout_chip: Arc<dyn ReadoutChip>) -> Self {
        Self {
            name: "RawTrackerHitMaker".to_string(),
            simulation,
            readout_chip,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn readout_chip(&self) -> &Arc<dyn ReadoutChip> {
        &self.readout_chip
    }
}

impl Digitizer for RawHitMaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn make_hits(
        &mut self,
        sensor: &Arc<Sensor>,
        truth_hits: &[TruthHit],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RawHit>> {
        self.simulation.set_sensor(Arc::clone(sensor));
        self.simulation.clear_readout();
        let computed = self
            .simulation
            .compute_electrode_data(truth_hits)
            .map(Clone::clone);
        self.simulation.clear_readout();
        let mut electrode_data = computed?;

        let mut raw_hits = Vec::new();
        for carrier in sensor.carriers() {
            let electrodes = sensor.require_readout_electrodes(carrier)?;
            let data = &mut electrode_data[carrier];
            let digitized = self.readout_chip.readout(data, electrodes, rng);
            for (cell, adc_values) in digitized {
                let channel = ChannelId {
                    sensor: sensor.id(),
                    side: carrier,
                    cell,
                };
                let truth_hits = data
                    .get(cell)
                    .map(|datum| datum.truth_hits().clone())
                    .unwrap_or_default();
                raw_hits.push(RawHit::new(channel, adc_values, 0).with_truth_hits(truth_hits));
            }
        }
        debug!(
            "{}: sensor {} produced {} raw hits from {} truth hits",
            self.name,
            sensor.id(),
            raw_hits.len(),
            truth_hits.len()
        );
        Ok(raw_hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readout::{GenericReadoutChip, GenericReadoutConfig};
    use crate::transport::CdfSensorSim;
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sisim_core::{surface_frame, ChargeCarrier, SensorId, Strips, TruthHitId};

    fn sensor() -> Arc<Sensor> {
        let thickness = 0.3;
        let strips = Strips::new(
            ChargeCarrier::Hole,
            100,
            0.05,
            20.0,
            surface_frame(ChargeCarrier::Hole, thickness, 0.0),
        )
        .unwrap();
        Arc::new(
            Sensor::builder(SensorId(12), thickness)
                .with_sense_electrodes(Box::new(strips))
                .build()
                .unwrap(),
        )
    }

    fn maker() -> RawHitMaker {
        let chip = GenericReadoutChip::new(GenericReadoutConfig::default()).unwrap();
        RawHitMaker::new(Box::new(CdfSensorSim::new()), Arc::new(chip))
    }

    #[test]
    fn test_raw_hits_carry_channel_and_truth() {
        let hit = TruthHit::new(
            TruthHitId(42),
            Point3::new(0.3, 1.0, -0.15),
            Point3::new(0.3, 1.0, 0.15),
            0.08,
        );
        let mut maker = maker();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let raw_hits = maker.make_hits(&sensor(), &[hit], &mut rng).unwrap();

        assert!(!raw_hits.is_empty());
        for raw in &raw_hits {
            assert_eq!(raw.channel.sensor, SensorId(12));
            assert_eq!(raw.channel.side, ChargeCarrier::Hole);
            assert_eq!(raw.time, 0);
            assert_eq!(raw.adc_values.len(), 1);
            assert!(raw.truth_hits.contains(&TruthHitId(42)));
        }
        assert_eq!(maker.collection_name(), "RawTrackerHitMaker_RawTrackerHits");
    }

    #[test]
    fn test_events_do_not_accumulate() {
        let hit = TruthHit::new(
            TruthHitId(1),
            Point3::new(-0.7, 0.0, -0.15),
            Point3::new(-0.7, 0.0, 0.15),
            0.05,
        );
        let sensor = sensor();
        let mut maker = maker();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let first = maker.make_hits(&sensor, std::slice::from_ref(&hit), &mut rng).unwrap();
        let second = maker.make_hits(&sensor, &[hit], &mut rng).unwrap();
        assert_eq!(first, second);

        let empty = maker.make_hits(&sensor, &[], &mut rng).unwrap();
        assert!(empty.is_empty());
    }
}
