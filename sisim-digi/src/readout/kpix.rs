//! Kpix dual-gain readout chip.
//!
//! Every hit is two words: the chip control register followed by the
//! channel readout register.
//!
//! Control register (8 bits):
//! - bits 2..8: version
//! - bit 1: gain mode (0 = single, 1 = double)
//! - bit 0: polarity (0 = positive, 1 = negative)
//!
//! Readout register:
//! - bit 28: gain range (0 = normal, 1 = low)
//! - bits 16..28: buffer number
//! - bits 8..16: time
//! - bits 0..8: ADC
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

use super::{add_noise, LinearNoise, NoiseLimits};
use rand::RngCore;
use sisim_core::silicon::E_CHARGE;
use sisim_core::{
    DigitizedChannelData, ElectrodeDataCollection, Error, RawHit, ReadoutChannel, ReadoutChip,
    Result, SensorElectrodes,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Register layout version written by this chip.
pub const VERSION: u32 = 1;

/// Feedback capacitance in single gain mode (F).
const NORMAL_GAIN_CAP: f64 = 400e-15;
/// Feedback capacitance in double gain mode (F).
const DOUBLE_GAIN_CAP: f64 = 200e-15;
/// Additional feedback capacitance of the low gain range (F).
const LOW_GAIN_CAP: f64 = 10e-12;
/// ADC counts per volt.
const ADC_GAIN: f64 = 2500.0;
/// Largest 8-bit ADC code.
const MAX_ADC: i32 = 0xFF;

/// Front-end gain mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum GainMode {
    Single = 0,
    #[default]
    Double = 1,
}

/// Input polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Polarity {
    #[default]
    Positive = 0,
    Negative = 1,
}

/// Gain range selected per hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum GainRange {
    #[default]
    Normal = 0,
    Low = 1,
}

/// Chip-level configuration word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegisters {
    pub version: u32,
    pub gain_mode: GainMode,
    pub polarity: Polarity,
}

impl ControlRegisters {
    pub fn new(gain_mode: GainMode, polarity: Polarity) -> Self {
        Self {
            version: VERSION,
            gain_mode,
            polarity,
        }
    }

    pub fn encode(&self) -> i32 {
        ((((self.version as i32) << 1) | self.gain_mode as i32) << 1) | self.polarity as i32
    }

    pub fn decode(word: i32) -> Self {
        let polarity = if word & 0x1 == 0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        };
        let gain_mode = if (word & 0x2) >> 1 == 0 {
            GainMode::Single
        } else {
            GainMode::Double
        };
        Self {
            version: ((word & 0xFC) >> 2) as u32,
            gain_mode,
            polarity,
        }
    }

    /// Front-end gain of the normal range (V per electron).
    fn normal_gain(&self) -> f64 {
        let feedback = match self.gain_mode {
            GainMode::Single => NORMAL_GAIN_CAP,
            GainMode::Double => DOUBLE_GAIN_CAP,
        };
        E_CHARGE / feedback
    }

    /// Front-end gain of the low range (V per electron).
    fn low_gain(&self) -> f64 {
        let feedback = match self.gain_mode {
            GainMode::Single => LOW_GAIN_CAP + NORMAL_GAIN_CAP,
            GainMode::Double => LOW_GAIN_CAP + DOUBLE_GAIN_CAP,
        };
        E_CHARGE / feedback
    }
}

/// Per-hit readout word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadoutRegisters {
    pub gain_range: GainRange,
    pub buffer: i32,
    pub time: i32,
    pub adc: i32,
}

impl ReadoutRegisters {
    pub fn encode(&self) -> i32 {
        ((((((self.gain_range as i32) << 12) | self.buffer) << 8) | self.time) << 8) | self.adc
    }

    pub fn decode(word: i32) -> Self {
        let gain_range = if (word & 0x1000_0000) >> 28 == 0 {
            GainRange::Normal
        } else {
            GainRange::Low
        };
        Self {
            gain_range,
            buffer: (word & 0x0FFF_0000) >> 16,
            time: (word & 0xFF00) >> 8,
            adc: word & 0xFF,
        }
    }
}

/// ADC counts per electron for a hit.
///
/// Encoding and decoding both go through this function so that the gain
/// used to reconstruct charge is the one used to digitize it.
pub fn compute_gain(readout: &ReadoutRegisters, control: &ControlRegisters) -> f64 {
    match readout.gain_range {
        GainRange::Normal => control.normal_gain() * ADC_GAIN,
        GainRange::Low => control.low_gain() * ADC_GAIN,
    }
}

/// Configuration for [`Kpix`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KpixConfig {
    /// Channel noise model (default: 300 + 30 e/pF).
    pub noise: LinearNoise,
    /// Seed threshold in noise RMS units (default: 4).
    pub noise_threshold: f64,
    /// Neighbour threshold in noise RMS units (default: 2).
    pub neighbor_threshold: f64,
    pub gain_mode: GainMode,
    pub polarity: Polarity,
    /// Front-end output (V) above which the low range is used (default: 1).
    pub gain_crossover: f64,
}

impl Default for KpixConfig {
    fn default() -> Self {
        Self {
            noise: LinearNoise::new(300.0, 30.0),
            noise_threshold: 4.0,
            neighbor_threshold: 2.0,
            gain_mode: GainMode::Double,
            polarity: Polarity::Positive,
            gain_crossover: 1.0,
        }
    }
}

impl KpixConfig {
    #[must_use]
    pub fn with_noise(mut self, intercept: f64, slope: f64) -> Self {
        self.noise = LinearNoise::new(intercept, slope);
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, noise: f64, neighbor: f64) -> Self {
        self.noise_threshold = noise;
        self.neighbor_threshold = neighbor;
        self
    }

    #[must_use]
    pub fn with_gain_mode(mut self, gain_mode: GainMode) -> Self {
        self.gain_mode = gain_mode;
        self
    }
}

/// Kpix chip model.
///
/// Noise added to populated channels never drives their charge negative,
/// and only channels whose ADC reads exactly zero are suppressed.
#[derive(Clone, Debug)]
pub struct Kpix {
    config: KpixConfig,
    control: ControlRegisters,
}

impl Kpix {
    pub fn new(config: KpixConfig) -> Result<Self> {
        if config.gain_crossover.is_nan() || config.gain_crossover <= 0.0 {
            return Err(Error::Config(format!(
                "Kpix gain crossover must be positive, got {} V",
                config.gain_crossover
            )));
        }
        let control = ControlRegisters::new(config.gain_mode, config.polarity);
        Ok(Self { config, control })
    }

    pub fn config(&self) -> &KpixConfig {
        &self.config
    }

    pub fn control_registers(&self) -> ControlRegisters {
        self.control
    }

    /// Readout register for a charge in electrons.
    ///
    /// All hits are recorded in buffer 0 at time 0.
    pub fn compute_readout_registers(&self, charge: i32) -> ReadoutRegisters {
        let gain_range =
            if f64::from(charge) * self.control.normal_gain() < self.config.gain_crossover {
                GainRange::Normal
            } else {
                GainRange::Low
            };
        let mut registers = ReadoutRegisters {
            gain_range,
            ..ReadoutRegisters::default()
        };
        let gain = compute_gain(&registers, &self.control);
        registers.adc = (f64::from(charge) * gain)
            .floor()
            .clamp(0.0, f64::from(MAX_ADC)) as i32;
        registers
    }

    fn decode_registers(hit: &RawHit) -> Result<(ControlRegisters, ReadoutRegisters)> {
        let [control, readout] = hit.adc_values[..] else {
            return Err(Error::MalformedRawHit {
                expected: 2,
                found: hit.adc_values.len(),
            });
        };
        let control = ControlRegisters::decode(control);
        if control.version != VERSION {
            return Err(Error::KpixVersion {
                expected: VERSION,
                found: control.version,
            });
        }
        Ok((control, ReadoutRegisters::decode(readout)))
    }
}

impl ReadoutChip for Kpix {
    fn name(&self) -> &'static str {
        "Kpix"
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
            clamp_negative: true,
        };
        add_noise(self, data, electrodes, limits, rng);

        let control = self.control.encode();
        data.iter()
            .filter_map(|(cell, datum)| {
                let registers = self.compute_readout_registers(datum.charge());
                (registers.adc != 0).then(|| (cell, vec![control, registers.encode()]))
            })
            .collect()
    }

    fn decode_charge(&self, hit: &RawHit) -> Result<f64> {
        let (control, readout) = Self::decode_registers(hit)?;
        Ok((f64::from(readout.adc) + 0.5) / compute_gain(&readout, &control))
    }

    fn decode_time(&self, hit: &RawHit) -> Result<i32> {
        let (_, readout) = Self::decode_registers(hit)?;
        Ok(readout.time)
    }
}
