//! Fixtures shared by the unit tests.

use nalgebra::Isometry3;
use rand::RngCore;
use sisim_core::{
    ChannelId, ChargeCarrier, DigitizedChannelData, ElectrodeDataCollection, Error, RawHit,
    ReadoutChannel, ReadoutChip, Result, SensorElectrodes, SensorId, Strips,
};

/// Constant noise in electrons.
pub(crate) struct FlatNoise(pub f64);

impl ReadoutChannel for FlatNoise {
    fn compute_noise(&self, _capacitance: f64) -> f64 {
        self.0
    }
}

/// Chip whose single ADC word is the charge in electrons.
pub(crate) struct UnitChip {
    noise: FlatNoise,
}

impl UnitChip {
    pub(crate) fn new(noise: f64) -> Self {
        Self {
            noise: FlatNoise(noise),
        }
    }
}

impl ReadoutChip for UnitChip {
    fn name(&self) -> &'static str {
        "UnitChip"
    }

    fn channel(&self, _cell: usize) -> &dyn ReadoutChannel {
        &self.noise
    }

    fn readout(
        &self,
        data: &mut ElectrodeDataCollection,
        _electrodes: &dyn SensorElectrodes,
        _rng: &mut dyn RngCore,
    ) -> DigitizedChannelData {
        data.iter()
            .map(|(cell, datum)| (cell, vec![datum.charge()]))
            .collect()
    }

    fn decode_charge(&self, hit: &RawHit) -> Result<f64> {
        hit.adc_values
            .first()
            .map(|adc| f64::from(*adc))
            .ok_or(Error::MalformedRawHit {
                expected: 1,
                found: 0,
            })
    }

    fn decode_time(&self, hit: &RawHit) -> Result<i32> {
        Ok(hit.time)
    }
}

pub(crate) fn strips(n_strips: usize) -> Strips {
    Strips::new(ChargeCarrier::Hole, n_strips, 0.05, 10.0, Isometry3::identity()).unwrap()
}

pub(crate) fn strip_hit(cell: usize, charge: i32) -> RawHit {
    let channel = ChannelId {
        sensor: SensorId(0),
        side: ChargeCarrier::Hole,
        cell,
    };
    RawHit::new(channel, vec![charge], 0)
}
