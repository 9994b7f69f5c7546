//! sisim-digi: charge transport and front-end digitization.
//!
//! This crate turns energy deposits on a silicon sensor into raw hits.
//!
//! # Key Components
//!
//! - [`CdfSensorSim`] - Drift, Lorentz angle, diffusion, trapping and AC coupling
//! - [`BasicReadoutChip`], [`GenericReadoutChip`], [`Kpix`] - Noise injection and ADC encodings
//! - [`RawHitMaker`] - Runs a simulation and a chip over one sensor
//!
//! # Randomness
//!
//! Every random draw comes from the `RngCore` passed to
//! [`ReadoutChip::readout`](sisim_core::ReadoutChip::readout), so a seeded
//! generator reproduces an event exactly.

mod digitizer;
pub mod readout;
pub mod sampling;
pub mod transport;

pub use digitizer::RawHitMaker;
pub use readout::{
    BasicReadoutChip, BasicReadoutConfig, GenericReadoutChip, GenericReadoutConfig, Kpix,
    KpixConfig, LinearNoise, BASIC_HIT_TIME,
};
pub use transport::{drift_direction, CdfSensorSim};
