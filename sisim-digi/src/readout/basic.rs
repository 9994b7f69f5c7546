//! Readout chip with thresholds in units of the channel noise.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc
)]

use super::{add_noise, digitize, LinearNoise, NoiseLimits};
use rand::RngCore;
use sisim_core::silicon::FC_PER_ELECTRON;
use sisim_core::{
    DigitizedChannelData, ElectrodeDataCollection, Error, RawHit, ReadoutChannel, ReadoutChip,
    Result, SensorElectrodes,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`BasicReadoutChip`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicReadoutConfig {
    /// Channel noise model.
    pub noise: LinearNoise,
    /// Seed threshold in units of noise RMS (default: 4).
    pub noise_threshold: f64,
    /// Neighbour threshold in units of noise RMS (default: 4).
    pub neighbor_threshold: f64,
    /// ADC resolution; 1 selects binary readout (default: 8).
    pub nbits: u32,
    /// Charge mapped to full scale, in fC (default: 20).
    pub dynamic_range: f64,
}

impl Default for BasicReadoutConfig {
    fn default() -> Self {
        Self {
            noise: LinearNoise::new(0.0, 0.0),
            noise_threshold: 4.0,
            neighbor_threshold: 4.0,
            nbits: 8,
            dynamic_range: 20.0,
        }
    }
}

impl BasicReadoutConfig {
    /// Set the noise model.
    #[must_use]
    pub fn with_noise(mut self, intercept: f64, slope: f64) -> Self {
        self.noise = LinearNoise::new(intercept, slope);
        self
    }

    /// Set seed and neighbour thresholds (noise RMS units).
    #[must_use]
    pub fn with_thresholds(mut self, noise: f64, neighbor: f64) -> Self {
        self.noise_threshold = noise;
        self.neighbor_threshold = neighbor;
        self
    }

    /// Set the ADC resolution.
    #[must_use]
    pub fn with_nbits(mut self, nbits: u32) -> Self {
        self.nbits = nbits;
        self
    }

    /// Set the dynamic range (fC).
    #[must_use]
    pub fn with_dynamic_range(mut self, dynamic_range: f64) -> Self {
        self.dynamic_range = dynamic_range;
        self
    }
}

/// Time reported for every hit of a [`BasicReadoutChip`]. Matches the
/// constant used by lcsim's `BasicReadoutChip`.
pub const BASIC_HIT_TIME: i32 = 3;

/// Linear ADC with a configurable number of bits.
///
/// A 1-bit chip is binary: any positive charge reads 1, decoded as the
/// full dynamic range. Added noise is not clamped. The chip records no
/// time, so [`ReadoutChip::decode_time`] returns [`BASIC_HIT_TIME`].
#[derive(Clone, Debug)]
pub struct BasicReadoutChip {
    config: BasicReadoutConfig,
}

impl BasicReadoutChip {
    pub fn new(config: BasicReadoutConfig) -> Result<Self> {
        if !(1..=30).contains(&config.nbits) {
            return Err(Error::Config(format!(
                "ADC bits must be in 1..=30, got {}",
                config.nbits
            )));
        }
        if config.dynamic_range.is_nan() || config.dynamic_range <= 0.0 {
            return Err(Error::Config(format!(
                "dynamic range must be positive, got {}",
                config.dynamic_range
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BasicReadoutConfig {
        &self.config
    }

    #[inline]
    fn is_binary(&self) -> bool {
        self.config.nbits == 1
    }

    #[inline]
    fn max_adc(&self) -> i32 {
        (1 << self.config.nbits) - 1
    }

    /// ADC counts per electron.
    #[inline]
    fn conversion(&self) -> f64 {
        FC_PER_ELECTRON * f64::from(self.max_adc()) / self.config.dynamic_range
    }

    /// ADC code for a charge in electrons.
    pub fn compute_adc(&self, charge: i32) -> i32 {
        if self.is_binary() {
            return i32::from(charge > 0);
        }
        (f64::from(charge) * self.conversion())
            .floor()
            .clamp(0.0, f64::from(self.max_adc())) as i32
    }
}

impl ReadoutChip for BasicReadoutChip {
    fn name(&self) -> &'static str {
        "BasicReadoutChip"
    }

    fn channel(&self, _cell: usize) -> &dyn ReadoutChannel {
        &self.config.noise
    }

    fn readout(
        &self,
        data: &mut ElectrodeDataCollection,
        electrodes: &dyn SensorElectrodes,
        rng: &mut dyn RngCore,
    ) -> DigitizedChannelData {
        let limits = NoiseLimits {
            seed: self.config.noise_threshold,
            neighbor: self.config.neighbor_threshold,
            clamp_negative: false,
        };
        add_noise(self, data, electrodes, limits, rng);

        let thresholds = |cell: usize| {
            let rms = self.noise_rms(electrodes, cell);
            (
                self.config.noise_threshold * rms,
                self.config.neighbor_threshold * rms,
            )
        };
        digitize(data, electrodes, &thresholds, |charge| self.compute_adc(charge))
    }

    fn decode_charge(&self, hit: &RawHit) -> Result<f64> {
        let adc = *hit.adc_values.first().ok_or(Error::MalformedRawHit {
            expected: 1,
            found: 0,
        })?;
        if self.is_binary() {
            return Ok(f64::from(adc) * self.config.dynamic_range);
        }
        Ok((f64::from(adc) + 0.5) / self.conversion())
    }

    fn decode_time(&self, _hit: &RawHit) -> Result<i32> {
        Ok(BASIC_HIT_TIME)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use nalgebra::Isometry3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sisim_core::{ChannelId, ChargeCarrier, ElectrodeData, SensorId, Strips, TruthHitId};

    fn raw_hit(adc: i32) -> RawHit {
        let channel = ChannelId {
            sensor: SensorId(0),
            side: ChargeCarrier::Hole,
            cell: 0,
        };
        RawHit::new(channel, vec![adc], 0)
    }

    #[test]
    fn test_binary_round_trip() {
        let chip = BasicReadoutChip::new(BasicReadoutConfig::default().with_nbits(1)).unwrap();
        for charge in [1, 17, 25_000, 10_000_000] {
            let adc = chip.compute_adc(charge);
            assert_eq!(adc, 1);
            assert_eq!(chip.decode_charge(&raw_hit(adc)).unwrap(), 20.0);
        }
        for charge in [0, -5] {
            let adc = chip.compute_adc(charge);
            assert_eq!(adc, 0);
            assert_eq!(chip.decode_charge(&raw_hit(adc)).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_adc_saturates() {
        let chip = BasicReadoutChip::new(BasicReadoutConfig::default()).unwrap();
        // 20 fC full scale over 255 counts: 490 electrons per count.
        assert_eq!(chip.compute_adc(1000), 2);
        assert_eq!(chip.compute_adc(-1000), 0);
        assert_eq!(chip.compute_adc(1_000_000), 255);

        let decoded = chip.decode_charge(&raw_hit(2)).unwrap();
        assert!((decoded - 2.5 / chip.conversion()).abs() < 1e-9);
    }

    #[test]
    fn test_time_is_fixed() {
        let chip = BasicReadoutChip::new(BasicReadoutConfig::default()).unwrap();
        assert_eq!(chip.decode_time(&raw_hit(7)).unwrap(), BASIC_HIT_TIME);
        assert_eq!(chip.decode_time(&raw_hit(0)).unwrap(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(BasicReadoutChip::new(BasicReadoutConfig::default().with_nbits(0)).is_err());
        assert!(BasicReadoutChip::new(BasicReadoutConfig::default().with_dynamic_range(0.0)).is_err());
    }

    #[test]
    fn test_noiseless_readout_is_idempotent() {
        let chip = BasicReadoutChip::new(BasicReadoutConfig::default().with_thresholds(0.0, 0.0))
            .unwrap();
        let electrodes =
            Strips::new(ChargeCarrier::Hole, 64, 0.05, 10.0, Isometry3::identity()).unwrap();
        let mut data = ElectrodeDataCollection::new();
        data.add(10, ElectrodeData::with_truth_hit(3000, TruthHitId(1)));
        data.add(11, ElectrodeData::with_truth_hit(12_000, TruthHitId(1)));
        data.add(12, ElectrodeData::with_truth_hit(200, TruthHitId(1)));

        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let first = chip.readout(&mut data.clone(), &electrodes, &mut rng);
        let second = chip.readout(&mut data, &electrodes, &mut rng);

        assert_eq!(first, second);
        assert_eq!(first.keys().copied().collect::<Vec<_>>(), vec![10, 11]);
    }
}
