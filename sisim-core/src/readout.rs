//! Readout chip traits.

use crate::electrode_data::ElectrodeDataCollection;
use crate::electrodes::SensorElectrodes;
use crate::error::Result;
use crate::hit::RawHit;
use rand::RngCore;
use std::collections::BTreeMap;

/// Raw chip words per readout cell, zero-suppressed.
pub type DigitizedChannelData = BTreeMap<usize, Vec<i32>>;

/// Front-end noise model of one channel.
pub trait ReadoutChannel: Send + Sync {
    /// Noise RMS in electrons for a given input capacitance (pF).
    fn compute_noise(&self, capacitance: f64) -> f64;
}

/// Front-end chip that digitizes electrode charge.
///
/// Implementations draw random numbers only from the `rng` passed in, in a
/// fixed order: electronic noise on occupied channels, spontaneous noise
/// hits, then the neighbour passes.
pub trait ReadoutChip: Send + Sync {
    /// Chip name.
    fn name(&self) -> &'static str;

    /// Noise model of a readout cell.
    fn channel(&self, cell: usize) -> &dyn ReadoutChannel;

    /// Adds noise to `data` and digitizes it.
    fn readout(
        &self,
        data: &mut ElectrodeDataCollection,
        electrodes: &dyn SensorElectrodes,
        rng: &mut dyn RngCore,
    ) -> DigitizedChannelData;

    /// Charge in electrons encoded in a raw hit.
    fn decode_charge(&self, hit: &RawHit) -> Result<f64>;

    /// Time encoded in a raw hit.
    fn decode_time(&self, hit: &RawHit) -> Result<i32>;

    /// Noise RMS of a cell given its electrodes.
    fn noise_rms(&self, electrodes: &dyn SensorElectrodes, cell: usize) -> f64 {
        self.channel(cell).compute_noise(electrodes.capacitance(cell))
    }
}
