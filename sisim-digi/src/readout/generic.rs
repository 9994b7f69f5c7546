//! Readout chip with thresholds in electrons and a linear 16-bit ADC.
#![allow(clippy::cast_possible_truncation, clippy::missing_errors_doc)]

use super::{add_noise, digitize, LinearNoise, NoiseLimits};
use rand::RngCore;
use sisim_core::silicon::FC_PER_ELECTRON;
use sisim_core::{
    DigitizedChannelData, ElectrodeDataCollection, Error, RawHit, ReadoutChannel, ReadoutChip,
    Result, SensorElectrodes,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest ADC code; words are stored as signed 16-bit integers.
pub const MAX_ADC: i32 = 32767;

/// Configuration for [`GenericReadoutChip`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GenericReadoutConfig {
    /// Channel noise model.
    pub noise: LinearNoise,
    /// Seed threshold in electrons (default: 0).
    pub noise_threshold: f64,
    /// Neighbour threshold in electrons (default: 0).
    pub neighbor_threshold: f64,
    /// ADC counts per fC (default: 100).
    pub adc_per_fc: f64,
}

impl Default for GenericReadoutConfig {
    fn default() -> Self {
        Self {
            noise: LinearNoise::new(0.0, 0.0),
            noise_threshold: 0.0,
            neighbor_threshold: 0.0,
            adc_per_fc: 100.0,
        }
    }
}

impl GenericReadoutConfig {
    #[must_use]
    pub fn with_noise(mut self, intercept: f64, slope: f64) -> Self {
        self.noise = LinearNoise::new(intercept, slope);
        self
    }

    /// Set seed and neighbour thresholds (electrons).
    #[must_use]
    pub fn with_thresholds(mut self, noise: f64, neighbor: f64) -> Self {
        self.noise_threshold = noise;
        self.neighbor_threshold = neighbor;
        self
    }

    #[must_use]
    pub fn with_adc_per_fc(mut self, adc_per_fc: f64) -> Self {
        self.adc_per_fc = adc_per_fc;
        self
    }
}

/// Linear readout chip.
///
/// Spontaneous noise hits are thrown using the thresholds divided by the
/// noise at the nominal capacitance; a noiseless chip throws none.
#[derive(Clone, Debug)]
pub struct GenericReadoutChip {
    config: GenericReadoutConfig,
}

impl GenericReadoutChip {
    pub fn new(config: GenericReadoutConfig) -> Result<Self> {
        if config.adc_per_fc.is_nan() || config.adc_per_fc <= 0.0 {
            return Err(Error::Config(format!(
                "ADC conversion must be positive, got {} counts/fC",
                config.adc_per_fc
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &GenericReadoutConfig {
        &self.config
    }

    /// ADC code for a charge in electrons.
    pub fn compute_adc(&self, charge: i32) -> i32 {
        (f64::from(charge) * FC_PER_ELECTRON * self.config.adc_per_fc)
            .floor()
            .clamp(0.0, f64::from(MAX_ADC)) as i32
    }

    fn normalized_limit(threshold: f64, nominal_noise: f64) -> f64 {
        if nominal_noise > 0.0 {
            threshold / nominal_noise
        } else {
            f64::INFINITY
        }
    }
}

impl ReadoutChip for GenericReadoutChip {
    fn name(&self) -> &'static str {
        "GenericReadoutChip"
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
        let nominal = self
            .config
            .noise
            .compute_noise(electrodes.nominal_capacitance());
        let limits = NoiseLimits {
            seed: Self::normalized_limit(self.config.noise_threshold, nominal),
            neighbor: Self::normalized_limit(self.config.neighbor_threshold, nominal),
            clamp_negative: false,
        };
        add_noise(self, data, electrodes, limits, rng);

        let thresholds = |_cell: usize| (self.config.noise_threshold, self.config.neighbor_threshold);
        digitize(data, electrodes, &thresholds, |charge| self.compute_adc(charge))
    }

    fn decode_charge(&self, hit: &RawHit) -> Result<f64> {
        let adc = *hit.adc_values.first().ok_or(Error::MalformedRawHit {
            expected: 1,
            found: 0,
        })?;
        Ok(f64::from(adc) / (FC_PER_ELECTRON * self.config.adc_per_fc))
    }

    fn decode_time(&self, hit: &RawHit) -> Result<i32> {
        Ok(hit.time)
    }
}
