//! Readout chip implementations and their shared noise model.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

mod basic;
mod generic;
pub mod kpix;

pub use basic::{BasicReadoutChip, BasicReadoutConfig, BASIC_HIT_TIME};
pub use generic::{GenericReadoutChip, GenericReadoutConfig};
pub use kpix::{Kpix, KpixConfig};

use crate::sampling;
use log::debug;
use rand::{Rng, RngCore};
use sisim_core::{
    DigitizedChannelData, ElectrodeData, ElectrodeDataCollection, ReadoutChannel, ReadoutChip,
    SensorElectrodes,
};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Noise RMS linear in capacitance: `intercept + slope * C`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearNoise {
    /// Noise at zero capacitance (electrons).
    pub intercept: f64,
    /// Noise per pF (electrons/pF).
    pub slope: f64,
}

impl LinearNoise {
    pub fn new(intercept: f64, slope: f64) -> Self {
        Self { intercept, slope }
    }
}

impl ReadoutChannel for LinearNoise {
    fn compute_noise(&self, capacitance: f64) -> f64 {
        self.intercept + self.slope * capacitance
    }
}

/// Thresholds of the noise model, in units of the channel noise RMS.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoiseLimits {
    /// Limit for spontaneous hits on empty channels.
    pub seed: f64,
    /// Limit for hits next to populated channels.
    pub neighbor: f64,
    /// Keep the charge of populated channels non-negative.
    pub clamp_negative: bool,
}

/// Adds electronic noise and random noise hits to `data`.
///
/// Draw order: one Gaussian per populated channel (ascending cell), then
/// the spontaneous-hit pass, then neighbour passes until one draws nothing.
pub(crate) fn add_noise(
    chip: &dyn ReadoutChip,
    data: &mut ElectrodeDataCollection,
    electrodes: &dyn SensorElectrodes,
    limits: NoiseLimits,
    rng: &mut dyn RngCore,
) {
    let occupied: Vec<(usize, i32)> = data.iter().map(|(cell, d)| (cell, d.charge())).collect();
    for (cell, charge) in occupied {
        let noise = chip.noise_rms(electrodes, cell);
        let mut added = (sampling::gaussian(rng) * noise).round() as i32;
        if limits.clamp_negative && charge + added < 0 {
            added = -charge;
        }
        data.add_charge(cell, added);
    }

    if chip.channel(0).compute_noise(electrodes.nominal_capacitance()) <= 0.0 {
        return;
    }

    let n_cells = electrodes.n_cells();
    let empty = n_cells.saturating_sub(data.len());
    let tail = sampling::upper_tail(limits.seed);
    let n_seeds = sampling::binomial(empty, tail, rng);
    for _ in 0..n_seeds {
        let cell = loop {
            let candidate = rng.gen_range(0..n_cells);
            if !data.contains(candidate) {
                break candidate;
            }
        };
        let charge = noise_charge(chip, electrodes, cell, tail, rng);
        data.add(cell, ElectrodeData::from_charge(charge));
    }

    let tail = sampling::upper_tail(limits.neighbor);
    let mut passes = 0;
    loop {
        let candidates: Vec<usize> = data
            .cells()
            .flat_map(|cell| electrodes.nearest_neighbor_cells(cell))
            .filter(|cell| !data.contains(*cell))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let n_draws = sampling::binomial(candidates.len(), tail, rng);
        if n_draws == 0 {
            break;
        }
        passes += 1;

        let before = data.len();
        for _ in 0..n_draws {
            let cell = loop {
                let candidate = candidates[rng.gen_range(0..candidates.len())];
                if !data.contains(candidate) {
                    break candidate;
                }
            };
            let charge = noise_charge(chip, electrodes, cell, tail, rng);
            data.add(cell, ElectrodeData::from_charge(charge));
        }
        if data.len() == before {
            break;
        }
    }
    debug!(
        "{}: {n_seeds} noise seeds, {passes} neighbor passes, {} channels",
        chip.name(),
        data.len()
    );
}

fn noise_charge(
    chip: &dyn ReadoutChip,
    electrodes: &dyn SensorElectrodes,
    cell: usize,
    tail: f64,
    rng: &mut dyn RngCore,
) -> i32 {
    (sampling::gaussian_above(tail, rng) * chip.noise_rms(electrodes, cell)).round() as i32
}

/// Seed and neighbour thresholds in electrons for one cell.
pub(crate) type ThresholdFn<'a> = dyn Fn(usize) -> (f64, f64) + 'a;

/// Zero-suppressed digitization shared by the Basic and Generic chips.
///
/// A channel below the neighbour threshold is dropped; between the
/// neighbour and seed thresholds it survives only next to a seed.
pub(crate) fn digitize(
    data: &ElectrodeDataCollection,
    electrodes: &dyn SensorElectrodes,
    thresholds: &ThresholdFn<'_>,
    compute_adc: impl Fn(i32) -> i32,
) -> DigitizedChannelData {
    let mut chip_data = DigitizedChannelData::new();
    for (cell, datum) in data.iter() {
        let charge = f64::from(datum.charge());
        let (seed, neighbor) = thresholds(cell);
        if charge < neighbor {
            continue;
        }
        if charge < seed {
            let has_seed = electrodes.nearest_neighbor_cells(cell).into_iter().any(|nbr| {
                data.get(nbr)
                    .is_some_and(|d| f64::from(d.charge()) >= thresholds(nbr).0)
            });
            if !has_seed {
                continue;
            }
        }
        let adc = compute_adc(datum.charge());
        if adc > 0 {
            chip_data.insert(cell, vec![adc]);
        }
    }
    chip_data
}
