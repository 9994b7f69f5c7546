//! Error types for sisim-core.

use crate::carrier::ChargeCarrier;
use thiserror::Error;

/// Result type alias for sisim operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for sisim operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Drift destination lies outside the sensor by more than the tolerance.
    #[error("drift destination outside sensor: distance {distance} mm from {carrier} side, thickness {thickness} mm")]
    DriftOutsideSensor {
        carrier: ChargeCarrier,
        distance: f64,
        thickness: f64,
    },

    /// Drift line never reaches a bias surface.
    #[error("{0} drift direction is parallel to the bias surface")]
    DriftParallelToSurface(ChargeCarrier),

    /// Seed threshold set below the neighbor threshold.
    #[error("seed threshold {seed} is below neighbor threshold {neighbor}")]
    SeedBelowNeighbor { seed: f64, neighbor: f64 },

    /// Sensor has no electrodes for the requested carrier.
    #[error("sensor {sensor} has no {carrier} electrodes")]
    MissingElectrodes { sensor: u32, carrier: ChargeCarrier },

    /// Simulation used before a sensor was bound.
    #[error("no sensor bound to the simulation")]
    MissingSensor,

    /// Readout chip reference missing.
    #[error("no readout chip configured for {0}")]
    MissingReadoutChip(String),

    /// Invalid geometry parameter.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The same raw hit was presented twice.
    #[error("duplicate raw hit on channel {0}")]
    DuplicateHit(usize),

    /// Two raw hits share a channel.
    #[error("duplicate channel number {0}")]
    DuplicateChannel(usize),

    /// Raw hit carries fewer words than the chip encodes.
    #[error("raw hit has {found} ADC words, expected {expected}")]
    MalformedRawHit { expected: usize, found: usize },

    /// Kpix control register reports a different chip version.
    #[error("Kpix version mismatch: register {found}, expected {expected}")]
    KpixVersion { expected: u32, found: u32 },
}
